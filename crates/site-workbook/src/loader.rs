//! Sheet extraction and row parsing
//!
//! The calamine layer only shells cells into a [`RawSheet`]; every
//! validation and conversion rule operates on `RawSheet`, which keeps the
//! rules unit-testable without binary fixtures.

use crate::{
    is_valid_latitude, is_valid_longitude, CompanyRecord, ProjectRow, Result, WorkbookData,
    WorkbookError, COMPANIES_SHEET, COMPANY_COLUMNS, PROJECTS_SHEET, PROJECT_COLUMNS,
};
use calamine::{Data, Reader, Xlsx};
use std::io::Cursor;
use tracing::info;

/// A cell reduced to the three shapes the sheets can contain.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

/// One sheet as a header row plus data rows, decoupled from calamine.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    /// Resolve required column headers to indices. Any missing header fails
    /// with the full required list, matching the upload error the user sees.
    fn column_indices(&self, required: &[&'static str]) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(required.len());
        for column in required {
            match self.headers.iter().position(|h| h == column) {
                Some(idx) => indices.push(idx),
                None => {
                    return Err(WorkbookError::MissingColumns {
                        sheet: self.name,
                        required: required.join(", "),
                    })
                }
            }
        }
        Ok(indices)
    }

    fn cell(&self, row: &[Cell], idx: usize) -> Cell {
        row.get(idx).cloned().unwrap_or(Cell::Empty)
    }

    /// Text value at `idx`. Numeric cells are accepted and formatted, the
    /// way a spreadsheet user expects a numeric site code to survive.
    fn text(&self, row: &[Cell], idx: usize, row_no: usize, column: &'static str) -> Result<String> {
        match self.cell(row, idx) {
            Cell::Text(s) => Ok(s),
            Cell::Number(n) => Ok(format!("{n}")),
            Cell::Empty => Err(WorkbookError::BadCell {
                sheet: self.name,
                row: row_no,
                column,
            }),
        }
    }

    /// Numeric value at `idx`. Text cells are parsed so coordinates typed
    /// as text still load; anything else fails the whole upload.
    fn number(&self, row: &[Cell], idx: usize, row_no: usize, column: &'static str) -> Result<f64> {
        match self.cell(row, idx) {
            Cell::Number(n) => Ok(n),
            Cell::Text(s) => s.trim().parse::<f64>().map_err(|_| WorkbookError::BadCell {
                sheet: self.name,
                row: row_no,
                column,
            }),
            Cell::Empty => Err(WorkbookError::BadCell {
                sheet: self.name,
                row: row_no,
                column,
            }),
        }
    }

    fn coordinate(
        &self,
        row: &[Cell],
        idx: usize,
        row_no: usize,
        column: &'static str,
        valid: fn(f64) -> bool,
    ) -> Result<f64> {
        let value = self.number(row, idx, row_no, column)?;
        if !valid(value) {
            return Err(WorkbookError::CoordinateOutOfRange {
                sheet: self.name,
                row: row_no,
                column,
                value,
            });
        }
        Ok(value)
    }
}

/// Load a complete workbook from uploaded bytes.
pub fn load_workbook_bytes(bytes: &[u8]) -> Result<WorkbookData> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;

    let companies_sheet = extract_sheet(&mut workbook, COMPANIES_SHEET)?;
    let projects_sheet = extract_sheet(&mut workbook, PROJECTS_SHEET)?;

    let companies = parse_companies(&companies_sheet)?;
    let projects = parse_projects(&projects_sheet)?;

    info!(
        "Loaded workbook: {} company locations, {} project sites",
        companies.len(),
        projects.len()
    );

    Ok(WorkbookData {
        companies,
        projects,
    })
}

fn extract_sheet<R>(workbook: &mut Xlsx<R>, name: &'static str) -> Result<RawSheet>
where
    R: std::io::Read + std::io::Seek,
{
    let range = workbook
        .worksheet_range(name)
        .map_err(|_| WorkbookError::SheetMissing(name))?;

    let mut rows = range.rows().map(|row| {
        row.iter().map(reduce_cell).collect::<Vec<Cell>>()
    });

    let headers = match rows.next() {
        Some(header_row) => header_row
            .into_iter()
            .map(|cell| match cell {
                Cell::Text(s) => s,
                Cell::Number(n) => format!("{n}"),
                Cell::Empty => String::new(),
            })
            .collect(),
        // A sheet with no header row can never satisfy the column check.
        None => Vec::new(),
    };

    Ok(RawSheet {
        name,
        headers,
        rows: rows
            .filter(|row| row.iter().any(|cell| *cell != Cell::Empty))
            .collect(),
    })
}

fn reduce_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Cell::Empty
            } else {
                Cell::Text(trimmed.to_string())
            }
        }
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        other => Cell::Text(other.to_string()),
    }
}

/// Parse the Companies sheet into records.
pub fn parse_companies(sheet: &RawSheet) -> Result<Vec<CompanyRecord>> {
    let indices = sheet.column_indices(&COMPANY_COLUMNS)?;
    let [location_idx, lat_idx, lon_idx, company_idx] =
        [indices[0], indices[1], indices[2], indices[3]];

    let mut records = Vec::with_capacity(sheet.rows.len());
    for (i, row) in sheet.rows.iter().enumerate() {
        // Spreadsheet row number: 1-based plus the header row.
        let row_no = i + 2;
        records.push(CompanyRecord {
            location: sheet.text(row, location_idx, row_no, COMPANY_COLUMNS[0])?,
            latitude: sheet.coordinate(row, lat_idx, row_no, COMPANY_COLUMNS[1], is_valid_latitude)?,
            longitude: sheet.coordinate(
                row,
                lon_idx,
                row_no,
                COMPANY_COLUMNS[2],
                is_valid_longitude,
            )?,
            company: sheet.text(row, company_idx, row_no, COMPANY_COLUMNS[3])?,
        });
    }
    Ok(records)
}

/// Parse the Projects sheet into rows.
pub fn parse_projects(sheet: &RawSheet) -> Result<Vec<ProjectRow>> {
    let indices = sheet.column_indices(&PROJECT_COLUMNS)?;
    let [name_idx, lat_idx, lon_idx] = [indices[0], indices[1], indices[2]];

    let mut rows = Vec::with_capacity(sheet.rows.len());
    for (i, row) in sheet.rows.iter().enumerate() {
        let row_no = i + 2;
        rows.push(ProjectRow {
            name: sheet.text(row, name_idx, row_no, PROJECT_COLUMNS[0])?,
            latitude: sheet.coordinate(row, lat_idx, row_no, PROJECT_COLUMNS[1], is_valid_latitude)?,
            longitude: sheet.coordinate(
                row,
                lon_idx,
                row_no,
                PROJECT_COLUMNS[2],
                is_valid_longitude,
            )?,
        });
    }
    Ok(rows)
}
