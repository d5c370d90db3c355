use std::fs::File;
use std::io::Write;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::input::OutputFormat;

/// 导出子域名列表到文件，列表为空时也会写出文件
pub fn export_results(
    subdomains: &[String],
    output_path: &str,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = render(subdomains, format)?;
    let mut file = File::create(output_path)?;
    file.write_all(data.as_bytes())?;

    println!("结果已导出到: {}", output_path);
    Ok(())
}

/// 按格式生成文件内容，所有格式都以换行结尾
pub fn render(subdomains: &[String], format: &OutputFormat) -> Result<String, serde_json::Error> {
    let data = match format {
        OutputFormat::Json => export_to_json(subdomains)?,
        OutputFormat::Csv => export_to_csv(subdomains),
        OutputFormat::Txt => export_to_txt(subdomains),
    };
    Ok(data)
}

/// JSON数组，四空格缩进
fn export_to_json(subdomains: &[String]) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    subdomains.serialize(&mut ser)?;
    let mut json = String::from_utf8_lossy(&buf).into_owned();
    json.push('\n');
    Ok(json)
}

/// 单列CSV，表头为 `Subdomain`
fn export_to_csv(subdomains: &[String]) -> String {
    let mut csv = String::from("Subdomain\n");
    for subdomain in subdomains {
        csv.push_str(&escape_csv(subdomain));
        csv.push('\n');
    }
    csv
}

fn export_to_txt(subdomains: &[String]) -> String {
    let mut txt = subdomains.join("\n");
    txt.push('\n');
    txt
}

/// CSV转义
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
