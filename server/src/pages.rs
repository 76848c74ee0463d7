use crate::mirror::MirrorEntry;
use std::fmt::Write;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        body
    )
}

fn table(heading: &str, value_label: &str, entries: &[MirrorEntry]) -> String {
    let mut html = format!(
        "<h2>{}</h2>\n<table>\n<tr><th>Timestamp</th><th>{}</th></tr>\n",
        escape(heading),
        escape(value_label)
    );
    for entry in entries {
        let value = match &entry.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape(&entry.timestamp),
            escape(&value)
        );
    }
    html.push_str("</table>\n");
    html
}

pub fn landing() -> String {
    document(
        "Sensor Hub",
        "<h1>Sensor Hub</h1>\n<ul>\n\
         <li><a href=\"/overall\">All sensors</a></li>\n\
         <li><a href=\"/plot_aht21\">Temperature and humidity chart</a></li>\n\
         <li><a href=\"/plot_mq6\">MQ6 chart</a></li>\n\
         <li><a href=\"/aht21\">Temperature and humidity readings</a></li>\n\
         <li><a href=\"/mq6\">MQ6 readings</a></li>\n\
         </ul>\n",
    )
}

pub fn mq6_listing(mq6: &[MirrorEntry]) -> String {
    let body = format!(
        "<h1>MQ6 Sensor Data</h1>\n<img src=\"/plot_mq6\" alt=\"MQ6 chart\">\n{}",
        table("Readings", "MQ6 Reading", mq6)
    );
    document("MQ6 Sensor Data", &body)
}

pub fn aht21_listing(temperature: &[MirrorEntry], humidity: &[MirrorEntry]) -> String {
    let body = format!(
        "<h1>AHT21 Sensor Data</h1>\n<img src=\"/plot_aht21\" alt=\"AHT21 chart\">\n{}{}",
        table("Temperature", "Temperature (°C)", temperature),
        table("Humidity", "Humidity (%)", humidity)
    );
    document("AHT21 Sensor Data", &body)
}
