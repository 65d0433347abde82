//! 表格导出
//!
//! 每行与界面表格显示一致：KB 保留两位小数，日期为固定格式。

use crate::error::{CoreError, PreconditionError, WriteError};
use crate::remote::Entry;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

pub const HEADER: [&str; 5] = ["File Name", "File Type", "Size (KB)", "Date of Upload", "URL"];

const LINE_END: &str = "\r\n";

/// 包含分隔符、引号或换行的字段需要加引号，内部引号加倍
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_record<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> io::Result<()> {
    let line = fields
        .iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(LINE_END.as_bytes())
}

/// 写出表头和每个条目一行；空列表是调用方错误
pub fn write_rows<W: Write>(entries: &[Entry], out: &mut W) -> Result<(), CoreError> {
    if entries.is_empty() {
        return Err(PreconditionError::EmptySelection.into());
    }
    write_record(out, &HEADER).map_err(WriteError::from)?;
    for entry in entries {
        write_record(out, &entry.display_row()).map_err(WriteError::from)?;
    }
    out.flush().map_err(WriteError::from)?;
    Ok(())
}

/// 导出到文件，检查在创建文件之前完成
pub fn export_rows(entries: &[Entry], destination: &Path) -> Result<(), CoreError> {
    if entries.is_empty() {
        return Err(PreconditionError::EmptySelection.into());
    }

    let file = std::fs::File::create(destination).map_err(WriteError::from)?;
    let mut out = io::BufWriter::new(file);
    write_rows(entries, &mut out)?;

    info!("已导出 {} 行到 {:?}", entries.len(), destination);
    Ok(())
}
