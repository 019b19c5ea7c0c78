//! CSV export of the request boards and rupee price formatting.
use crate::model::RequestWithProducts;

pub const REQUEST_CSV_HEADERS: [&str; 8] = [
    "Reference ID",
    "Name",
    "Email",
    "Phone",
    "Status",
    "Created At",
    "Products",
    "Total Value",
];

/// Quotes values containing a comma, doubling embedded quotes.
pub fn csv_field(value: &str) -> String {
    if value.contains(',') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Header row followed by one line per row, `\n`-separated.
pub fn to_csv<R, F>(headers: &[&str], rows: &[R], mut fields: F) -> String
where
    F: FnMut(&R) -> Vec<String>,
{
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(headers.join(","));
    for row in rows {
        let line: Vec<String> = fields(row).iter().map(|v| csv_field(v)).collect();
        lines.push(line.join(","));
    }
    lines.join("\n")
}

pub fn requests_csv(requests: &[RequestWithProducts]) -> String {
    to_csv(&REQUEST_CSV_HEADERS, requests, |r| {
        let titles: Vec<&str> = r.products.iter().map(|p| p.title.as_str()).collect();
        vec![
            r.request.id.to_string(),
            r.request.user_name.clone(),
            r.request.user_email.clone(),
            r.request.user_phone.clone(),
            r.request.status.to_string(),
            r.request.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            titles.join("; "),
            r.total_value().to_string(),
        ]
    })
}

/// Whole rupees with Indian digit grouping, e.g. `₹1,00,000`. Digits come
/// from the rounded `f64` itself, so large values are never truncated.
/// Non-finite prices are shown as-is.
pub fn format_price(price: f64) -> String {
    if !price.is_finite() {
        return format!("₹{}", price);
    }
    let rounded = price.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    let digits = format!("{:.0}", rounded.abs());

    let grouped = if digits.len() <= 3 {
        digits
    } else {
        let (head, tail) = digits.split_at(digits.len() - 3);
        let mut groups: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 2 {
            groups.push(&head[end - 2..end]);
            end -= 2;
        }
        groups.push(&head[..end]);
        groups.reverse();
        format!("{},{}", groups.join(","), tail)
    };
    format!("{}₹{}", sign, grouped)
}
