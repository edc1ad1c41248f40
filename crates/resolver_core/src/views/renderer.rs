//! Render phase: view model → priced payload in one output format.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceViolation, ResolverError};
use crate::events::Price;
use crate::views::projector::ViewModel;

/// Items that fit on one rendered page, for per-page pricing.
pub const ITEMS_PER_PAGE: usize = 50;

pub const CURRENCY: &str = "$MIND";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Markdown,
    Html,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Markdown => "markdown",
            Format::Html => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Markdown => "text/markdown",
            Format::Html => "text/html",
        }
    }
}

impl FromStr for Format {
    type Err = GovernanceViolation;

    /// Unknown formats are unpriced by definition.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "markdown" | "md" | "mdx" => Ok(Format::Markdown),
            "html" => Ok(Format::Html),
            _ => Err(GovernanceViolation::UnpricedFormat {
                format: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum PriceRule {
    Flat(Decimal),
    PerPage(Decimal),
}

/// Format → price. A format missing from the schedule cannot be rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSchedule {
    pub currency: String,
    pub rules: BTreeMap<Format, PriceRule>,
}

impl Default for PriceSchedule {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(Format::Json, PriceRule::Flat(Decimal::new(5, 2)));
        rules.insert(Format::Markdown, PriceRule::PerPage(Decimal::new(50, 1)));
        rules.insert(Format::Html, PriceRule::PerPage(Decimal::new(50, 1)));
        Self {
            currency: CURRENCY.to_string(),
            rules,
        }
    }
}

impl PriceSchedule {
    pub fn without(mut self, format: Format) -> Self {
        self.rules.remove(&format);
        self
    }

    pub fn is_priced(&self, format: Format) -> bool {
        self.rules.contains_key(&format)
    }

    pub fn price(&self, format: Format, item_count: usize) -> Result<Price, GovernanceViolation> {
        let rule = self
            .rules
            .get(&format)
            .ok_or_else(|| GovernanceViolation::UnpricedFormat {
                format: format.as_str().to_string(),
            })?;
        let amount = match *rule {
            PriceRule::Flat(amount) => amount,
            PriceRule::PerPage(per_page) => per_page * Decimal::from(pages(item_count)),
        };
        Ok(Price {
            currency: self.currency.clone(),
            amount,
        })
    }
}

fn pages(item_count: usize) -> u64 {
    item_count.div_ceil(ITEMS_PER_PAGE).max(1) as u64
}

/// Rendered output of one model in one format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResult {
    pub format: Format,
    pub payload: String,
    pub price: Price,
    pub content_digest: String,
}

pub fn render(
    model: &ViewModel,
    format: Format,
    prices: &PriceSchedule,
) -> Result<ViewResult, ResolverError> {
    let price = prices.price(format, model.item_count())?;
    let payload = match format {
        Format::Json => serde_json::to_string(&model.to_canonical_json())
            .map_err(|e| ResolverError::Internal(e.into()))?,
        Format::Markdown => render_markdown(model),
        Format::Html => render_html(model),
    };
    Ok(ViewResult {
        format,
        payload,
        price,
        content_digest: model.content_digest.clone(),
    })
}

fn render_markdown(model: &ViewModel) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", model.title);
    for section in &model.sections {
        let _ = writeln!(out, "## {}\n", section.heading);
        for item in &section.items {
            let _ = write!(out, "- **{}**", item.name);
            if let Some(path) = &item.path {
                let _ = write!(out, " `{path}`");
            }
            if let Some(kind) = &item.kind {
                let _ = write!(out, " ({kind})");
            }
            if let Some(description) = &item.description {
                let _ = write!(out, ": {description}");
            }
            out.push('\n');
            for (label, values) in &item.links {
                let _ = writeln!(out, "  - {label}: {}", values.join(", "));
            }
            for (metric, value) in &item.metrics {
                let _ = writeln!(out, "  - {metric}: {value}");
            }
        }
        out.push('\n');
    }
    if !model.summary.is_empty() {
        out.push_str("## Summary\n\n");
        for (key, value) in &model.summary {
            let _ = writeln!(out, "- {key}: {value}");
        }
        out.push('\n');
    }
    let _ = writeln!(out, "<!-- {} -->", model.content_digest);
    out
}

fn render_html(model: &ViewModel) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<article data-view=\"{}\" data-digest=\"{}\"><h1>{}</h1>",
        model.view_type,
        escape(&model.content_digest),
        escape(&model.title)
    );
    for section in &model.sections {
        let _ = write!(out, "<section><h2>{}</h2><ul>", escape(&section.heading));
        for item in &section.items {
            let _ = write!(out, "<li><strong>{}</strong>", escape(&item.name));
            if let Some(path) = &item.path {
                let _ = write!(out, " <code>{}</code>", escape(path));
            }
            if let Some(kind) = &item.kind {
                let _ = write!(out, " ({})", escape(kind));
            }
            if let Some(description) = &item.description {
                let _ = write!(out, "<p>{}</p>", escape(description));
            }
            if !item.links.is_empty() || !item.metrics.is_empty() {
                out.push_str("<dl>");
                for (label, values) in &item.links {
                    let _ = write!(
                        out,
                        "<dt>{}</dt><dd>{}</dd>",
                        escape(label),
                        escape(&values.join(", "))
                    );
                }
                for (metric, value) in &item.metrics {
                    let _ = write!(out, "<dt>{}</dt><dd>{value}</dd>", escape(metric));
                }
                out.push_str("</dl>");
            }
            out.push_str("</li>");
        }
        out.push_str("</ul></section>");
    }
    if !model.summary.is_empty() {
        out.push_str("<section><h2>Summary</h2><dl>");
        for (key, value) in &model.summary {
            let _ = write!(out, "<dt>{}</dt><dd>{value}</dd>", escape(key));
        }
        out.push_str("</dl></section>");
    }
    out.push_str("</article>");
    out
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Row;
    use crate::value::PropValue;
    use crate::views::projector::project;
    use crate::views::selector::ViewType;

    fn index_model(n: usize) -> ViewModel {
        let rows: Vec<Row> = (0..n)
            .map(|i| {
                let mut r = Row::new();
                r.insert("name".into(), PropValue::from(format!("item-{i:03}")));
                r.insert("node_label".into(), PropValue::from("U4_Knowledge_Object"));
                r
            })
            .collect();
        project(ViewType::Index, "acme", "/", &rows)
    }

    #[test]
    fn test_format_aliases() {
        assert_eq!("mdx".parse::<Format>().unwrap(), Format::Markdown);
        assert_eq!("HTML".parse::<Format>().unwrap(), Format::Html);
        let err = "pdf".parse::<Format>().unwrap_err();
        assert_eq!(err.reason(), "unpriced_format");
    }

    #[test]
    fn test_json_price_is_flat() {
        let price = PriceSchedule::default().price(Format::Json, 500).unwrap();
        assert_eq!(price.amount, Decimal::new(5, 2));
        assert_eq!(price.currency, "$MIND");
    }

    #[test]
    fn test_page_price_scales_with_items() {
        let prices = PriceSchedule::default();
        assert_eq!(prices.price(Format::Html, 0).unwrap().amount, Decimal::from(5));
        assert_eq!(prices.price(Format::Html, 50).unwrap().amount, Decimal::from(5));
        assert_eq!(
            prices.price(Format::Markdown, 51).unwrap().amount,
            Decimal::from(10)
        );
    }

    #[test]
    fn test_unpriced_format_refuses_to_render() {
        let prices = PriceSchedule::default().without(Format::Html);
        let err = render(&index_model(1), Format::Html, &prices).unwrap_err();
        assert_eq!(err.reason(), "unpriced_format");
    }

    #[test]
    fn test_json_payload_carries_digest() {
        let model = index_model(2);
        let result = render(&model, Format::Json, &PriceSchedule::default()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result.payload).unwrap();
        assert_eq!(parsed["content_digest"], model.content_digest.as_str());
        assert_eq!(result.content_digest, model.content_digest);
    }

    #[test]
    fn test_markdown_lists_items() {
        let result = render(&index_model(2), Format::Markdown, &PriceSchedule::default()).unwrap();
        assert!(result.payload.starts_with("# Index: acme"));
        assert!(result.payload.contains("- **item-001**"));
    }

    #[test]
    fn test_html_escapes_content() {
        let mut model = index_model(1);
        model.sections[0].items[0].name = "<script>".into();
        let result = render(&model, Format::Html, &PriceSchedule::default()).unwrap();
        assert!(result.payload.contains("&lt;script&gt;"));
        assert!(!result.payload.contains("<script>"));
    }
}
