#![allow(dead_code)]

use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};

/// A cell written into a fixture workbook.
#[derive(Clone, Debug)]
pub enum Fx {
    S(&'static str),
    N(f64),
    B(bool),
    Blank,
}

pub use Fx::{B, Blank, N, S};

/// Builds an xlsx workbook in memory, one `(name, rows)` pair per sheet.
pub fn workbook_bytes(sheets: &[(&str, Vec<Vec<Fx>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match cell {
                    Fx::S(text) => {
                        worksheet.write_string(r, c, *text).unwrap();
                    }
                    Fx::N(value) => {
                        worksheet.write_number(r, c, *value).unwrap();
                    }
                    Fx::B(value) => {
                        worksheet.write_boolean(r, c, *value).unwrap();
                    }
                    Fx::Blank => {}
                }
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

/// Writes a fixture workbook to `dir/file_name` and returns its path.
pub fn write_workbook(dir: &Path, file_name: &str, sheets: &[(&str, Vec<Vec<Fx>>)]) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, workbook_bytes(sheets)).unwrap();
    path
}

/// Month / Revenue / Units table used across the tests.
pub fn sales_rows() -> Vec<Vec<Fx>> {
    vec![
        vec![S("Month"), S("Revenue"), S("Units")],
        vec![S("Jan"), N(100.0), N(3.0)],
        vec![S("Feb"), N(250.5), N(5.0)],
        vec![S("Mar"), S("n/a"), N(4.0)],
        vec![S("Apr"), N(80.0), N(1.0)],
    ]
}
