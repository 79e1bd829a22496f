// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Receipt rendering.
//
// An order is first laid out as a list of logical lines, then rendered into
// one of two wire formats:
//
//   - raw ESC/POS-style text for printers reached over a plain socket
//   - ePOS-Print XML (SOAP envelope) for the printer's HTTP control service
//
// Both renderers are pure: the same order always yields the same bytes.

use ordercast_core::config::PrintConfig;
use ordercast_core::types::Order;

// ---------------------------------------------------------------------------
// ESC/POS command bytes
// ---------------------------------------------------------------------------

/// ESC @ -- initialise printer.
const ESC_INIT: &str = "\x1b@";

/// ESC a n -- justification (0 left, 1 center).
const ESC_ALIGN_LEFT: &str = "\x1ba\x00";
const ESC_ALIGN_CENTER: &str = "\x1ba\x01";

/// GS V 1 -- partial cut.
const GS_CUT_PARTIAL: &str = "\x1dV\x01";

/// Blank lines fed before the cut so the footer clears the blade.
const FEED_BEFORE_CUT: usize = 3;

// ---------------------------------------------------------------------------
// ePOS-Print envelope
// ---------------------------------------------------------------------------

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const EPOS_PRINT_NS: &str = "http://www.epson-pos.com/schemas/2011/03/epos-print";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReceiptLine {
    align: Align,
    text: String,
}

impl ReceiptLine {
    fn left(text: impl Into<String>) -> Self {
        Self {
            align: Align::Left,
            text: text.into(),
        }
    }

    fn center(text: impl Into<String>) -> Self {
        Self {
            align: Align::Center,
            text: text.into(),
        }
    }
}

/// Lays out and renders order receipts.
#[derive(Debug, Clone)]
pub struct ReceiptFormatter {
    shop_name: String,
    footer: String,
    line_width: usize,
}

impl Default for ReceiptFormatter {
    fn default() -> Self {
        Self::from_config(&PrintConfig::default())
    }
}

impl ReceiptFormatter {
    pub fn new(shop_name: impl Into<String>, footer: impl Into<String>, line_width: usize) -> Self {
        Self {
            shop_name: shop_name.into(),
            footer: footer.into(),
            line_width: line_width.max(1),
        }
    }

    pub fn from_config(config: &PrintConfig) -> Self {
        Self::new(config.shop_name.clone(), config.footer.clone(), config.line_width)
    }

    /// Raw text receipt for direct socket delivery.
    pub fn format_raw(&self, order: &Order) -> String {
        let mut out = String::with_capacity(512);
        out.push_str(ESC_INIT);

        let mut current = Align::Left;
        for line in self.layout(order) {
            if line.align != current {
                out.push_str(match line.align {
                    Align::Left => ESC_ALIGN_LEFT,
                    Align::Center => ESC_ALIGN_CENTER,
                });
                current = line.align;
            }
            out.push_str(&line.text);
            out.push('\n');
        }
        if current != Align::Left {
            out.push_str(ESC_ALIGN_LEFT);
        }

        for _ in 0..FEED_BEFORE_CUT {
            out.push('\n');
        }
        out.push_str(GS_CUT_PARTIAL);
        out
    }

    /// ePOS-Print XML document for the HTTP(S) control service.
    pub fn format_control_xml(&self, order: &Order) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str(&format!("<s:Envelope xmlns:s=\"{SOAP_ENVELOPE_NS}\">\n"));
        out.push_str("<s:Body>\n");
        out.push_str(&format!("<epos-print xmlns=\"{EPOS_PRINT_NS}\">\n"));

        let mut current: Option<Align> = None;
        for line in self.layout(order) {
            if current != Some(line.align) {
                out.push_str(match line.align {
                    Align::Left => "<text align=\"left\"/>\n",
                    Align::Center => "<text align=\"center\"/>\n",
                });
                current = Some(line.align);
            }
            out.push_str("<text>");
            out.push_str(&escape_xml(&line.text));
            out.push_str("&#10;</text>\n");
        }

        out.push_str(&format!("<feed line=\"{FEED_BEFORE_CUT}\"/>\n"));
        out.push_str("<cut type=\"feed\"/>\n");
        out.push_str("</epos-print>\n");
        out.push_str("</s:Body>\n");
        out.push_str("</s:Envelope>\n");
        out
    }

    fn layout(&self, order: &Order) -> Vec<ReceiptLine> {
        let rule = "-".repeat(self.line_width);
        let mut lines = vec![
            ReceiptLine::center(clean(&self.shop_name)),
            ReceiptLine::left(""),
            ReceiptLine::left(format!("Order #{}", clean(order.display_number()))),
        ];

        if let Some(created) = order.created_at {
            lines.push(ReceiptLine::left(format!(
                "Date: {}",
                created.format("%Y-%m-%d %H:%M")
            )));
        }
        if !order.customer_name.trim().is_empty() {
            lines.push(ReceiptLine::left(format!("Customer: {}", clean(&order.customer_name))));
        }
        if !order.customer_phone.trim().is_empty() {
            lines.push(ReceiptLine::left(format!("Phone: {}", clean(&order.customer_phone))));
        }

        lines.push(ReceiptLine::left(rule.clone()));
        for item in &order.items {
            lines.push(ReceiptLine::left(format!(
                "{} x {} - {:.2}",
                item.quantity,
                clean(&item.name),
                item.line_total()
            )));
        }
        lines.push(ReceiptLine::left(rule));

        lines.push(ReceiptLine::left(format!("TOTAL: {:.2}", order.total_amount)));
        if !order.delivery_method.trim().is_empty() {
            lines.push(ReceiptLine::left(format!("Delivery: {}", clean(&order.delivery_method))));
        }
        if !order.notes.trim().is_empty() {
            lines.push(ReceiptLine::left(format!("Notes: {}", clean(&order.notes))));
        }

        if !self.footer.trim().is_empty() {
            lines.push(ReceiptLine::left(""));
            lines.push(ReceiptLine::center(clean(&self.footer)));
        }
        lines
    }
}

/// Collapse free text onto one printable line.
///
/// Control characters would be interpreted as printer commands on the raw
/// socket and are not legal in XML 1.0, so they become spaces.
fn clean(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escape the five markup-significant characters.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use ordercast_core::types::LineItem;
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_order() -> Order {
        Order {
            id: "ord-1".into(),
            order_number: Some("1042".into()),
            location: "siteA".into(),
            customer_name: "Ada Lovelace".into(),
            customer_phone: "+44 20 7946 0000".into(),
            customer_email: "ada@example.com".into(),
            items: vec![
                LineItem {
                    name: "Margherita".into(),
                    quantity: 2,
                    price: 9.5,
                },
                LineItem {
                    name: "Tiramisu".into(),
                    quantity: 1,
                    price: 5.25,
                },
            ],
            total_amount: 24.25,
            delivery_method: "pickup".into(),
            notes: "extra basil".into(),
            created_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 18, 4, 0).unwrap()),
        }
    }

    fn formatter() -> ReceiptFormatter {
        ReceiptFormatter::new("TRATTORIA", "Grazie!", 24)
    }

    #[test]
    fn raw_receipt_snapshot() {
        let raw = formatter().format_raw(&sample_order());
        let expected = concat!(
            "\x1b@",
            "\x1ba\x01TRATTORIA\n",
            "\x1ba\x00\n",
            "Order #1042\n",
            "Date: 2026-03-01 18:04\n",
            "Customer: Ada Lovelace\n",
            "Phone: +44 20 7946 0000\n",
            "------------------------\n",
            "2 x Margherita - 19.00\n",
            "1 x Tiramisu - 5.25\n",
            "------------------------\n",
            "TOTAL: 24.25\n",
            "Delivery: pickup\n",
            "Notes: extra basil\n",
            "\n",
            "\x1ba\x01Grazie!\n",
            "\x1ba\x00",
            "\n\n\n",
            "\x1dV\x01",
        );
        assert_eq!(raw, expected);
    }

    #[test]
    fn renderers_are_deterministic() {
        let f = formatter();
        let order = sample_order();
        assert_eq!(f.format_raw(&order), f.format_raw(&order.clone()));
        assert_eq!(f.format_control_xml(&order), f.format_control_xml(&order.clone()));
    }

    #[test]
    fn xml_has_one_text_element_per_line() {
        let xml = formatter().format_control_xml(&sample_order());
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<s:Envelope"));
        assert!(xml.contains("<text>2 x Margherita - 19.00&#10;</text>\n"));
        assert!(xml.contains("<text align=\"center\"/>\n<text>TRATTORIA&#10;</text>"));
        assert!(xml.trim_end().ends_with("<cut type=\"feed\"/>\n</epos-print>\n</s:Body>\n</s:Envelope>"));
        // Same logical lines in both formats.
        let text_lines = xml.matches("&#10;</text>").count();
        let raw_lines = formatter()
            .format_raw(&sample_order())
            .trim_end_matches("\n\n\n\x1dV\x01")
            .matches('\n')
            .count();
        assert_eq!(text_lines, raw_lines);
    }

    #[test]
    fn markup_in_free_text_is_escaped() {
        let mut order = sample_order();
        order.customer_name = "Tom & \"Jerry\" <b>".into();
        order.notes = "no <onions> & 'no' garlic".into();

        let xml = formatter().format_control_xml(&order);
        assert!(xml.contains("Customer: Tom &amp; &quot;Jerry&quot; &lt;b&gt;"));
        assert!(xml.contains("Notes: no &lt;onions&gt; &amp; &apos;no&apos; garlic"));
        assert_well_formed(&xml);
    }

    #[test]
    fn control_characters_cannot_reach_the_printer() {
        let mut order = sample_order();
        order.notes = "ring bell\x1b@\x1dV\x00twice\nplease".into();

        let raw = formatter().format_raw(&order);
        assert!(raw.contains("Notes: ring bell @ V twice please\n"));
        // The only command bytes are the ones the formatter emits itself.
        assert_eq!(raw.matches("\x1dV").count(), 1);
        assert_well_formed(&formatter().format_control_xml(&order));
    }

    #[test]
    fn optional_lines_are_skipped() {
        let mut order = sample_order();
        order.order_number = None;
        order.customer_phone = String::new();
        order.notes = "   ".into();
        order.created_at = None;
        order.delivery_method = String::new();

        let raw = formatter().format_raw(&order);
        assert!(raw.contains("Order #ord-1\n"));
        assert!(!raw.contains("Phone:"));
        assert!(!raw.contains("Notes:"));
        assert!(!raw.contains("Date:"));
        assert!(!raw.contains("Delivery:"));
    }

    /// Minimal structural check: every `<` opens a tag, tags balance, and
    /// every `&` starts a known entity.
    fn assert_well_formed(xml: &str) {
        let body = xml
            .strip_prefix("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n")
            .expect("declaration");
        let mut stack: Vec<String> = Vec::new();
        let mut rest = body;
        while let Some(start) = rest.find('<') {
            check_text(&rest[..start]);
            let end = rest[start..].find('>').expect("unterminated tag") + start;
            let tag = &rest[start + 1..end];
            assert!(!tag.contains('<'), "nested '<' in tag {tag}");
            if let Some(name) = tag.strip_prefix('/') {
                assert_eq!(stack.pop().as_deref(), Some(name), "mismatched close tag");
            } else if !tag.ends_with('/') {
                let name = tag.split_whitespace().next().expect("tag name");
                stack.push(name.to_string());
            }
            rest = &rest[end + 1..];
        }
        check_text(rest);
        assert!(stack.is_empty(), "unclosed tags: {stack:?}");
    }

    fn check_text(text: &str) {
        assert!(!text.contains('>'), "bare '>' in text: {text}");
        let mut rest = text;
        while let Some(i) = rest.find('&') {
            let tail = &rest[i..];
            let ok = ["&amp;", "&lt;", "&gt;", "&quot;", "&apos;", "&#10;"]
                .iter()
                .any(|e| tail.starts_with(e));
            assert!(ok, "bare '&' in text: {text}");
            rest = &rest[i + 1..];
        }
    }
}
