use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File is not valid UTF-8 text: {0}")]
    Decode(#[from] std::str::Utf8Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("File has no header row")]
    MissingHeader,
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),
}

/// Every column either file schema understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    Date,
    Description,
    Amount,
    Type,
    Category,
    PaidBy,
    PaidTo,
    SplitType,
    SplitMember,
    ExcludedFromBudget,
    Notes,
    RowId,
    ReimbursesRow,
    TransactionRow,
    Member,
    OwedAmount,
    OwedPercentage,
    PaidAmount,
    PaidPercentage,
}

impl Column {
    pub fn name(self) -> &'static str {
        self.aliases()[0]
    }

    /// Normalised header spellings, canonical name first.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Date => &["date", "transaction_date"],
            Column::Description => &["description", "desc", "title"],
            Column::Amount => &["amount", "total"],
            Column::Type => &["type", "transaction_type", "kind"],
            Column::Category => &["category", "category_name"],
            Column::PaidBy => &["paid_by", "payer", "paid_by_member"],
            Column::PaidTo => &["paid_to", "payee", "recipient"],
            Column::SplitType => &["split_type", "split"],
            Column::SplitMember => &["split_member", "split_with"],
            Column::ExcludedFromBudget => &["excluded_from_budget", "exclude_from_budget", "excluded"],
            Column::Notes => &["notes", "note", "memo"],
            Column::RowId => &["row_id", "csv_row", "row"],
            Column::ReimbursesRow => &["reimburses_row_id", "reimburses_row", "reimburses"],
            Column::TransactionRow => &["transaction_row", "transaction_row_id", "row_id", "row"],
            Column::Member => &["member", "member_name", "name"],
            Column::OwedAmount => &["owed_amount", "owed"],
            Column::OwedPercentage => &["owed_percentage", "owed_percent", "owed_pct"],
            Column::PaidAmount => &["paid_amount", "paid"],
            Column::PaidPercentage => &["paid_percentage", "paid_percent", "paid_pct"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schema {
    Transactions,
    Splits,
}

impl Schema {
    pub fn columns(self) -> &'static [Column] {
        match self {
            Schema::Transactions => &[
                Column::Date,
                Column::Description,
                Column::Amount,
                Column::Type,
                Column::Category,
                Column::PaidBy,
                Column::PaidTo,
                Column::SplitType,
                Column::SplitMember,
                Column::ExcludedFromBudget,
                Column::Notes,
                Column::RowId,
                Column::ReimbursesRow,
            ],
            Schema::Splits => &[
                Column::TransactionRow,
                Column::Member,
                Column::OwedAmount,
                Column::OwedPercentage,
                Column::PaidAmount,
                Column::PaidPercentage,
            ],
        }
    }

    pub fn required(self) -> &'static [Column] {
        match self {
            Schema::Transactions => &[Column::Description, Column::Amount],
            Schema::Splits => &[Column::TransactionRow, Column::Member],
        }
    }
}

/// One data record: trimmed fields in file order plus the physical line it started on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawImportRow {
    pub row_number: usize,
    pub fields: Vec<String>,
}

/// A parsed file: the header as written, the schema columns it maps to, and the rows.
#[derive(Debug, Clone)]
pub struct CsvTable {
    pub schema: Schema,
    pub headers: Vec<String>,
    columns: HashMap<Column, usize>,
    pub rows: Vec<RawImportRow>,
}

impl CsvTable {
    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    /// The row's value for `column`, or `""` when the file lacks the column or
    /// the row is short.
    pub fn field<'a>(&self, row: &'a RawImportRow, column: Column) -> &'a str {
        self.columns
            .get(&column)
            .and_then(|&idx| row.fields.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn map_columns(schema: Schema, headers: &[String]) -> Result<HashMap<Column, usize>, ParseError> {
    let mut columns = HashMap::new();
    for (idx, header) in headers.iter().enumerate() {
        let key = normalize_header(header);
        if let Some(column) = schema
            .columns()
            .iter()
            .find(|c| c.aliases().contains(&key.as_str()))
        {
            // First occurrence wins when a file repeats a column.
            columns.entry(*column).or_insert(idx);
        }
    }

    for required in schema.required() {
        if !columns.contains_key(required) {
            return Err(ParseError::MissingColumn(required.name()));
        }
    }

    Ok(columns)
}

/// Maps record byte offsets to 1-based physical line numbers. Offsets must be
/// requested in increasing order.
struct LineCounter<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, byte: usize) -> usize {
        // A record's reported offset can sit before the blank lines the reader skipped.
        let mut start = byte.clamp(self.pos, self.bytes.len());
        while start < self.bytes.len() && matches!(self.bytes[start], b'\r' | b'\n') {
            start += 1;
        }
        self.line += self.bytes[self.pos..start].iter().filter(|&&b| b == b'\n').count();
        self.pos = start;
        self.line
    }
}

/// Splits `data` into a header and data rows. Blank lines are skipped but still
/// counted, so `row_number` always matches the line a user sees in an editor.
pub fn parse(data: &[u8], schema: Schema) -> Result<CsvTable, ParseError> {
    let text = std::str::from_utf8(data)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut lines = LineCounter::new(text);
    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result?;
        let fields: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
        if fields.iter().all(|f| f.is_empty()) {
            continue;
        }

        if headers.is_none() {
            headers = Some(fields);
            continue;
        }

        let byte = record.position().map(|p| p.byte() as usize).unwrap_or(0);
        rows.push(RawImportRow {
            row_number: lines.line_at(byte),
            fields,
        });
    }

    let headers = headers.ok_or(ParseError::MissingHeader)?;
    let columns = map_columns(schema, &headers)?;

    Ok(CsvTable {
        schema,
        headers,
        columns,
        rows,
    })
}
