//! Cell style table from `xl/styles.xml`
//!
//! Only the parts of a style that the ledger reads or changes are modelled
//! (number format, font weight, solid fill, horizontal alignment). Fonts and
//! fills are kept as their original XML so derived styles keep the rest.

use super::workbook::{CellFormat, HorizontalAlignment};
use anyhow::Result;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::io::Cursor;

/// First id available for custom number formats
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

/// Built-in number formats
fn builtin_num_fmt(id: u32) -> Option<&'static str> {
    let code = match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}

const BUILTIN_NUM_FMT_IDS: [u32; 28] = [
    0, 1, 2, 3, 4, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 37, 38, 39, 40, 45,
    46, 47, 48, 49,
];

#[derive(Debug, Clone, PartialEq)]
pub struct FontStyle {
    pub xml: String,
    pub bold: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillStyle {
    pub xml: String,
    /// Foreground colour of a solid pattern fill, uppercase ARGB
    pub rgb: Option<String>,
}

/// One entry of `cellXfs`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XfStyle {
    pub num_fmt_id: u32,
    pub font_id: u32,
    pub fill_id: u32,
    pub border_id: u32,
    pub xf_id: u32,
    pub horizontal: Option<HorizontalAlignment>,
}

/// Entry counts of each table as read from the file
#[derive(Debug, Clone, Default, PartialEq)]
struct Loaded {
    fonts: usize,
    fills: usize,
    cell_xfs: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleTable {
    /// Custom number formats by id, in insertion order of ids
    num_fmts: BTreeMap<u32, String>,
    new_num_fmts: Vec<u32>,
    pub fonts: Vec<FontStyle>,
    pub fills: Vec<FillStyle>,
    pub cell_xfs: Vec<XfStyle>,
    loaded: Loaded,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Fonts,
    Fills,
    CellXfs,
    Other,
}

impl StyleTable {
    /// Parse the content of `xl/styles.xml`
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut table = StyleTable::default();
        let mut section = Section::Other;
        let mut capture: Option<Writer<Cursor<Vec<u8>>>> = None;
        let mut bold = false;
        let mut rgb = None;
        let mut solid = false;
        let mut current_xf: Option<XfStyle> = None;

        loop {
            let event = reader.read_event()?;
            if let Some(writer) = capture.as_mut()
                && !matches!(event, Event::Eof)
            {
                writer.write_event(event.clone())?;
            }

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match (section, e.name().as_ref()) {
                        (_, b"numFmt") => {
                            let mut id = None;
                            let mut code = String::new();
                            for attr in e.attributes().flatten() {
                                match attr.key.as_ref() {
                                    b"numFmtId" => id = attr.unescape_value()?.parse::<u32>().ok(),
                                    b"formatCode" => code = attr.unescape_value()?.to_string(),
                                    _ => {}
                                }
                            }
                            if let Some(id) = id
                                && !code.is_empty()
                            {
                                table.num_fmts.insert(id, code);
                            }
                        }
                        (_, b"fonts") if !is_empty => section = Section::Fonts,
                        (_, b"fills") if !is_empty => section = Section::Fills,
                        (_, b"cellXfs") if !is_empty => section = Section::CellXfs,
                        (_, b"cellStyleXfs") | (_, b"dxfs") if !is_empty => {
                            section = Section::Other
                        }
                        (Section::Fonts, b"font") | (Section::Fills, b"fill") => {
                            bold = false;
                            rgb = None;
                            solid = false;
                            let mut writer = Writer::new(Cursor::new(Vec::new()));
                            writer.write_event(event.clone())?;
                            if is_empty {
                                table.push_captured(section, writer, false, None)?;
                            } else {
                                capture = Some(writer);
                            }
                        }
                        (Section::Fonts, b"b") => {
                            bold = e
                                .attributes()
                                .flatten()
                                .find(|a| a.key.as_ref() == b"val")
                                .is_none_or(|a| matches!(a.value.as_ref(), b"1" | b"true"));
                        }
                        (Section::Fills, b"patternFill") => {
                            solid = e.attributes().flatten().any(|a| {
                                a.key.as_ref() == b"patternType" && a.value.as_ref() == b"solid"
                            });
                        }
                        (Section::Fills, b"fgColor") if solid => {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"rgb" {
                                    rgb = Some(attr.unescape_value()?.to_ascii_uppercase());
                                }
                            }
                        }
                        (Section::CellXfs, b"xf") => {
                            let xf = parse_xf(e)?;
                            if is_empty {
                                table.cell_xfs.push(xf);
                            } else {
                                current_xf = Some(xf);
                            }
                        }
                        (Section::CellXfs, b"alignment") => {
                            if let Some(xf) = current_xf.as_mut() {
                                for attr in e.attributes().flatten() {
                                    if attr.key.as_ref() == b"horizontal" {
                                        xf.horizontal =
                                            HorizontalAlignment::parse(&attr.unescape_value()?);
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => match e.name().as_ref() {
                    b"font" | b"fill" => {
                        if let Some(writer) = capture.take() {
                            table.push_captured(section, writer, bold, rgb.take())?;
                        }
                    }
                    b"xf" => {
                        if let Some(xf) = current_xf.take() {
                            table.cell_xfs.push(xf);
                        }
                    }
                    b"fonts" | b"fills" | b"cellXfs" => section = Section::Other,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        table.loaded = Loaded {
            fonts: table.fonts.len(),
            fills: table.fills.len(),
            cell_xfs: table.cell_xfs.len(),
        };
        Ok(table)
    }

    fn push_captured(
        &mut self,
        section: Section,
        writer: Writer<Cursor<Vec<u8>>>,
        bold: bool,
        rgb: Option<String>,
    ) -> Result<()> {
        let xml = String::from_utf8(writer.into_inner().into_inner())?;
        match section {
            Section::Fonts => self.fonts.push(FontStyle { xml, bold }),
            Section::Fills => self.fills.push(FillStyle { xml, rgb }),
            _ => {}
        }
        Ok(())
    }

    /// Format code of a number format id
    pub fn num_fmt_code(&self, id: u32) -> Option<&str> {
        self.num_fmts
            .get(&id)
            .map(String::as_str)
            .or_else(|| builtin_num_fmt(id))
    }

    /// Resolve a `cellXfs` index into the attributes the ledger works with
    pub fn format_for(&self, style_id: u32) -> CellFormat {
        let Some(xf) = self.cell_xfs.get(style_id as usize) else {
            return CellFormat::default();
        };
        CellFormat {
            style_id: Some(style_id),
            bold: self
                .fonts
                .get(xf.font_id as usize)
                .is_some_and(|f| f.bold),
            horizontal: xf.horizontal,
            fill: self
                .fills
                .get(xf.fill_id as usize)
                .and_then(|f| f.rgb.clone()),
            num_fmt: self
                .num_fmt_code(xf.num_fmt_id)
                .filter(|code| *code != "General")
                .map(str::to_string),
        }
    }

    /// Find or create the `cellXfs` index that renders `format`
    pub fn intern(&mut self, format: &CellFormat) -> u32 {
        if let Some(id) = format.style_id
            && self.format_for(id) == *format
        {
            return id;
        }
        if format.is_default() {
            return 0;
        }

        let mut xf = format
            .style_id
            .and_then(|id| self.cell_xfs.get(id as usize).cloned())
            .unwrap_or_default();
        let base_bold = self.fonts.get(xf.font_id as usize).is_some_and(|f| f.bold);
        if base_bold != format.bold {
            xf.font_id = self.font_with_weight(xf.font_id, format.bold);
        }
        let base_fill = self.fills.get(xf.fill_id as usize).and_then(|f| f.rgb.clone());
        if base_fill != format.fill {
            xf.fill_id = match &format.fill {
                Some(rgb) => self.solid_fill(rgb),
                None => 0,
            };
        }
        xf.num_fmt_id = match &format.num_fmt {
            Some(code) => self.num_fmt_id(code),
            None => 0,
        };
        xf.horizontal = format.horizontal;

        if let Some(pos) = self.cell_xfs.iter().position(|x| *x == xf) {
            return pos as u32;
        }
        self.cell_xfs.push(xf);
        (self.cell_xfs.len() - 1) as u32
    }

    fn font_with_weight(&mut self, base: u32, bold: bool) -> u32 {
        let base_xml = self
            .fonts
            .get(base as usize)
            .map(|f| f.xml.clone())
            .unwrap_or_else(|| "<font/>".to_string());
        let xml = with_bold(&base_xml, bold);
        if let Some(pos) = self.fonts.iter().position(|f| f.xml == xml) {
            return pos as u32;
        }
        self.fonts.push(FontStyle { xml, bold });
        (self.fonts.len() - 1) as u32
    }

    fn solid_fill(&mut self, rgb: &str) -> u32 {
        let rgb = rgb.to_ascii_uppercase();
        if let Some(pos) = self
            .fills
            .iter()
            .position(|f| f.rgb.as_deref() == Some(rgb.as_str()))
        {
            return pos as u32;
        }
        let xml = format!(
            r#"<fill><patternFill patternType="solid"><fgColor rgb="{rgb}"/><bgColor indexed="64"/></patternFill></fill>"#
        );
        self.fills.push(FillStyle {
            xml,
            rgb: Some(rgb),
        });
        (self.fills.len() - 1) as u32
    }

    fn num_fmt_id(&mut self, code: &str) -> u32 {
        if let Some((id, _)) = self.num_fmts.iter().find(|(_, c)| c.as_str() == code) {
            return *id;
        }
        if let Some(id) = BUILTIN_NUM_FMT_IDS
            .iter()
            .find(|id| builtin_num_fmt(**id) == Some(code))
        {
            return *id;
        }
        let id = self
            .num_fmts
            .keys()
            .next_back()
            .map_or(FIRST_CUSTOM_NUM_FMT, |last| (last + 1).max(FIRST_CUSTOM_NUM_FMT));
        self.num_fmts.insert(id, code.to_string());
        self.new_num_fmts.push(id);
        id
    }

    /// Whether styles were added since the table was read
    pub fn has_additions(&self) -> bool {
        !self.new_num_fmts.is_empty()
            || self.fonts.len() > self.loaded.fonts
            || self.fills.len() > self.loaded.fills
            || self.cell_xfs.len() > self.loaded.cell_xfs
    }

    /// Number of custom number formats, including added ones
    pub fn num_fmt_count(&self) -> usize {
        self.num_fmts.len()
    }

    /// `<numFmt>` elements added since the table was read
    pub fn added_num_fmts_xml(&self) -> String {
        self.new_num_fmts
            .iter()
            .filter_map(|id| {
                self.num_fmts.get(id).map(|code| {
                    format!(r#"<numFmt numFmtId="{id}" formatCode="{}"/>"#, escape(code))
                })
            })
            .collect()
    }

    pub fn added_fonts_xml(&self) -> String {
        self.fonts
            .iter()
            .skip(self.loaded.fonts)
            .map(|f| f.xml.as_str())
            .collect()
    }

    pub fn added_fills_xml(&self) -> String {
        self.fills
            .iter()
            .skip(self.loaded.fills)
            .map(|f| f.xml.as_str())
            .collect()
    }

    pub fn added_xfs_xml(&self) -> String {
        self.cell_xfs
            .iter()
            .skip(self.loaded.cell_xfs)
            .map(xf_xml)
            .collect()
    }
}

fn parse_xf(e: &quick_xml::events::BytesStart) -> Result<XfStyle> {
    let mut xf = XfStyle::default();
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value()?.parse::<u32>().unwrap_or(0);
        match attr.key.as_ref() {
            b"numFmtId" => xf.num_fmt_id = value,
            b"fontId" => xf.font_id = value,
            b"fillId" => xf.fill_id = value,
            b"borderId" => xf.border_id = value,
            b"xfId" => xf.xf_id = value,
            _ => {}
        }
    }
    Ok(xf)
}

fn xf_xml(xf: &XfStyle) -> String {
    let mut xml = format!(
        r#"<xf numFmtId="{}" fontId="{}" fillId="{}" borderId="{}" xfId="{}" applyNumberFormat="1" applyFont="1" applyFill="1""#,
        xf.num_fmt_id, xf.font_id, xf.fill_id, xf.border_id, xf.xf_id
    );
    match xf.horizontal {
        Some(h) => xml.push_str(&format!(
            r#" applyAlignment="1"><alignment horizontal="{}"/></xf>"#,
            h.as_str()
        )),
        None => xml.push_str("/>"),
    }
    xml
}

/// Add or remove the `<b/>` element of a font
fn with_bold(font_xml: &str, bold: bool) -> String {
    let mut xml = font_xml.to_string();
    for tag in [r#"<b val="1"/>"#, r#"<b val="true"/>"#, r#"<b val="0"/>"#, "<b/>"] {
        xml = xml.replace(tag, "");
    }
    if xml.ends_with("/>") && !xml.contains("</font>") {
        xml = "<font></font>".to_string();
    }
    if bold && let Some(pos) = xml.find('>') {
        xml.insert_str(pos + 1, "<b/>");
    }
    xml
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="1"><numFmt numFmtId="164" formatCode="m/d/yyyy"/></numFmts>
<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>
<fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="ffffff00"/><bgColor indexed="64"/></patternFill></fill></fills>
<borders count="1"><border/></borders>
<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
<cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="164" fontId="1" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment horizontal="center"/></xf><xf numFmtId="0" fontId="0" fillId="2" borderId="0" xfId="0"/></cellXfs>
<dxfs count="1"><dxf><font><b/></font><fill><patternFill><bgColor rgb="FF00FF00"/></patternFill></fill></dxf></dxfs>
</styleSheet>"#;

    #[test]
    fn test_parse_styles() {
        let table = StyleTable::from_xml(STYLES).unwrap();
        assert_eq!(table.fonts.len(), 2);
        assert_eq!(table.fills.len(), 3);
        assert_eq!(table.cell_xfs.len(), 3);

        let header = table.format_for(1);
        assert!(header.bold);
        assert_eq!(header.horizontal, Some(HorizontalAlignment::Center));
        assert_eq!(header.num_fmt.as_deref(), Some("m/d/yyyy"));

        let total = table.format_for(2);
        assert_eq!(total.fill.as_deref(), Some("FFFFFF00"));
        assert!(!total.bold);
        assert_eq!(table.format_for(0).num_fmt, None);
        assert!(!table.has_additions());
    }

    #[test]
    fn test_intern_reuses_and_appends() {
        let mut table = StyleTable::from_xml(STYLES).unwrap();
        let header = table.format_for(1);
        assert_eq!(table.intern(&header), 1);

        let mut bold_total = table.format_for(2);
        bold_total.bold = true;
        bold_total.horizontal = Some(HorizontalAlignment::Center);
        let id = table.intern(&bold_total);
        assert_eq!(id, 3);
        assert_eq!(table.format_for(id), CellFormat { style_id: Some(3), ..bold_total.clone() });
        // Interning the same attributes again finds the new entry
        assert_eq!(table.intern(&CellFormat { style_id: Some(2), ..bold_total }), 3);

        assert!(table.has_additions());
        assert!(table.added_xfs_xml().contains(r#"<alignment horizontal="center"/>"#));
        assert_eq!(table.added_fonts_xml(), "");
    }

    #[test]
    fn test_intern_new_number_format() {
        let mut table = StyleTable::from_xml(STYLES).unwrap();
        let format = CellFormat {
            num_fmt: Some("yyyy-mm-dd".into()),
            ..Default::default()
        };
        let id = table.intern(&format);
        assert_eq!(table.format_for(id).num_fmt.as_deref(), Some("yyyy-mm-dd"));
        assert_eq!(
            table.added_num_fmts_xml(),
            r#"<numFmt numFmtId="165" formatCode="yyyy-mm-dd"/>"#
        );
    }

    #[test]
    fn test_with_bold() {
        assert_eq!(
            with_bold("<font><sz val=\"11\"/></font>", true),
            "<font><b/><sz val=\"11\"/></font>"
        );
        assert_eq!(
            with_bold("<font><b/><sz val=\"11\"/></font>", false),
            "<font><sz val=\"11\"/></font>"
        );
        assert_eq!(with_bold("<font/>", true), "<font><b/></font>");
    }
}
