//! Normalization of raw source records into [`Transaction`] values.
//!
//! Each source ships its own column names; the normalizers resolve a small
//! alias table per field, parse dates and amounts, decide the transaction
//! kind, and attach a keyword-derived category.

use chrono::NaiveDate;
use serde_json::Value;

use acumen_types::{AcumenError, Payload, Result, Transaction, TransactionKind};

use crate::sources::SourceKind;

// ---------------------------------------------------------------------------
// Column aliases
// ---------------------------------------------------------------------------

const BANK_DATE: &[&str] = &["date", "transaction_date", "Date", "Transaction Date"];
const BANK_AMOUNT: &[&str] = &["amount", "Amount", "value", "Value"];
const BANK_DESCRIPTION: &[&str] = &[
    "description",
    "Description",
    "memo",
    "Memo",
    "details",
    "Details",
];
const BANK_TYPE: &[&str] = &["type", "Type", "transaction_type", "Transaction Type"];

const ECOMMERCE_DATE: &[&str] = &["date", "order_date", "sale_date", "Date"];
const ECOMMERCE_AMOUNT: &[&str] = &["amount", "total", "revenue", "sales", "Amount"];
const ECOMMERCE_DESCRIPTION: &[&str] = &["description", "product", "order_id", "Description"];

// ---------------------------------------------------------------------------
// Normalizers
// ---------------------------------------------------------------------------

/// Normalize one source's raw records according to its kind.
pub fn normalize_records(kind: SourceKind, records: &[Payload]) -> Result<Vec<Transaction>> {
    match kind {
        SourceKind::Bank => normalize_bank_records(records),
        SourceKind::Ecommerce => normalize_ecommerce_records(records),
        SourceKind::Ocr => normalize_ocr_documents(records),
    }
}

/// Bank statement rows. A `debit` transaction type or a negative amount marks
/// an expense; the stored amount is always the positive magnitude.
pub fn normalize_bank_records(records: &[Payload]) -> Result<Vec<Transaction>> {
    records.iter().map(normalize_bank_record).collect()
}

fn normalize_bank_record(record: &Payload) -> Result<Transaction> {
    let date = parse_date(field(record, BANK_DATE), "bank")?;
    let mut amount = parse_amount(field(record, BANK_AMOUNT), "bank")?;
    let description = field(record, BANK_DESCRIPTION)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tx_type = field(record, BANK_TYPE)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    let kind = if tx_type.contains("debit") || amount < 0.0 {
        amount = amount.abs();
        TransactionKind::Expense
    } else {
        TransactionKind::Income
    };

    Ok(Transaction {
        date,
        amount,
        kind,
        category: categorize(&description).to_string(),
        description,
        source: "bank".to_string(),
    })
}

/// E-commerce order rows. Orders are always income in the `sales` category.
pub fn normalize_ecommerce_records(records: &[Payload]) -> Result<Vec<Transaction>> {
    records.iter().map(normalize_ecommerce_record).collect()
}

fn normalize_ecommerce_record(record: &Payload) -> Result<Transaction> {
    let date = parse_date(field(record, ECOMMERCE_DATE), "ecommerce")?;
    let amount = parse_amount(field(record, ECOMMERCE_AMOUNT), "ecommerce")?.abs();
    let label = field(record, ECOMMERCE_DESCRIPTION)
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(Transaction {
        date,
        amount,
        kind: TransactionKind::Income,
        category: "sales".to_string(),
        description: format!("E-commerce sale: {label}"),
        source: "ecommerce".to_string(),
    })
}

/// OCR-extracted invoice and receipt documents. Documents are always expenses
/// in the `purchase` category.
pub fn normalize_ocr_documents(documents: &[Payload]) -> Result<Vec<Transaction>> {
    documents.iter().map(normalize_ocr_document).collect()
}

fn normalize_ocr_document(document: &Payload) -> Result<Transaction> {
    let date = parse_date(document.get("date"), "ocr")?;
    let amount = parse_amount(document.get("amount"), "ocr")?.abs();
    let label = document
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("Invoice/Receipt");

    Ok(Transaction {
        date,
        amount,
        kind: TransactionKind::Expense,
        category: "purchase".to_string(),
        description: format!("OCR: {label}"),
        source: "ocr".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Categorization
// ---------------------------------------------------------------------------

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("salary", &["salary", "payroll", "wage"]),
    ("rent", &["rent", "lease"]),
    (
        "utilities",
        &["electricity", "water", "internet", "phone", "utility"],
    ),
    ("supplies", &["supplies", "materials", "inventory"]),
    ("marketing", &["marketing", "advertising", "ad"]),
    ("travel", &["travel", "transport", "fuel", "gas"]),
    ("sales", &["sale", "revenue", "income", "payment received"]),
];

/// Categorize a transaction from keywords in its description. First matching
/// category wins; descriptions with no keyword fall back to `other`.
pub fn categorize(description: &str) -> &'static str {
    let lowered = description.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| lowered.contains(k)) {
            return category;
        }
    }
    "other"
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

fn field<'a>(record: &'a Payload, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|name| record.get(*name))
}

fn parse_date(value: Option<&Value>, source: &str) -> Result<NaiveDate> {
    let Some(value) = value else {
        return Err(malformed(source, "missing date field"));
    };
    let text = match value {
        Value::String(s) => s.trim(),
        other => return Err(malformed(source, &format!("unparseable date: {other}"))),
    };

    // Accept ISO dates with or without a time component.
    let date_part = text.split(['T', ' ']).next().unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y/%m/%d"))
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d-%m-%Y"))
        .map_err(|_| malformed(source, &format!("unparseable date: {text}")))
}

fn parse_amount(value: Option<&Value>, source: &str) -> Result<f64> {
    match value {
        // Sources may omit the amount column entirely; treat that as zero
        // rather than failing the whole source.
        None => Ok(0.0),
        Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed(source, &format!("unparseable amount: {s}"))),
        Some(other) => Err(malformed(source, &format!("unparseable amount: {other}"))),
    }
}

fn malformed(source: &str, message: &str) -> AcumenError {
    AcumenError::Agent {
        stage: "extraction".to_string(),
        message: format!("{source} source: {message}"),
        transient: false,
    }
}
