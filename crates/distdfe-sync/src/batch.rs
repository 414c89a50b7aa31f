//! Batch decoding: `docZip` payloads into [`NormalizedDocument`]s.
//!
//! Each document goes through the same independent pipeline:
//!
//! 1. base64 → gzip bytes
//! 2. gunzip → UTF-8 XML text
//! 3. parse → element tree
//! 4. classify by root element (`resNFe` summary, `nfeProc`/`NFe` full)
//! 5. normalize the shared fields
//!
//! A failure at any step drops that document only. The batch as a whole
//! cannot fail.

use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset, NaiveDate};
use distdfe_core::{AccessKey, Cursor, CursorError, DocumentKind, NormalizedDocument};
use flate2::read::GzDecoder;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::envelope::RawDocument;
use crate::xml::{Element, XmlError};

/// `infNFe/@Id` is the access key behind this literal.
pub const FULL_ID_PREFIX: &str = "NFe";

/// Upper bound on one decompressed document. Real documents are a few KB;
/// anything past this is dropped rather than buffered.
pub const MAX_DOCUMENT_BYTES: u64 = 16 * 1024 * 1024;

/// Offset applied to date-only `dEmi` values (Brasília time, UTC-03:00).
const DATE_ONLY_OFFSET_SECS: i32 = -3 * 3600;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("gzip decompression failed: {0}")]
    Gzip(#[source] std::io::Error),
    #[error("decompressed payload exceeds {0} bytes")]
    TooLarge(u64),
    #[error("decompressed payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("decompressed payload is not well-formed XML: {0}")]
    Xml(#[from] XmlError),
    #[error("unsupported document <{0}>")]
    UnsupportedShape(String),
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("invalid access key: {0}")]
    AccessKey(String),
    #[error("invalid amount {0:?}")]
    Amount(String),
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("invalid NSU: {0}")]
    SequenceNumber(#[from] CursorError),
}

/// A document that was left out of the batch, and why.
#[derive(Debug)]
pub struct DocumentFailure {
    pub sequence_number: Option<String>,
    pub error: DecodeError,
}

/// Outcome of decoding one batch: the survivors in input order plus the
/// failures.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: Vec<NormalizedDocument>,
    pub failures: Vec<DocumentFailure>,
}

/// Decode every document in the batch, keeping input order.
pub fn decode_batch(batch: Vec<RawDocument>) -> BatchReport {
    let mut report = BatchReport::default();
    for raw in batch {
        match decode_document(&raw) {
            Ok(doc) => report.documents.push(doc),
            Err(error) => {
                warn!(
                    nsu = raw.sequence_number.as_deref().unwrap_or("-"),
                    schema = raw.schema.as_deref().unwrap_or("-"),
                    error = %error,
                    "dropping undecodable document"
                );
                report.failures.push(DocumentFailure {
                    sequence_number: raw.sequence_number,
                    error,
                });
            }
        }
    }
    report
}

/// Decode a single `docZip` entry.
pub fn decode_document(raw: &RawDocument) -> Result<NormalizedDocument, DecodeError> {
    let sequence_number: Cursor = raw
        .sequence_number
        .as_deref()
        .filter(|nsu| !nsu.trim().is_empty())
        .ok_or(DecodeError::MissingField("docZip/@NSU"))?
        .parse()?;
    let xml = decompress(&raw.compressed_payload)?;
    let root = Element::parse(&xml)?;

    match root.name.as_str() {
        "resNFe" => normalize_summary(&root, xml, sequence_number),
        "nfeProc" => {
            let inf = root
                .path(&["NFe", "infNFe"])
                .ok_or(DecodeError::MissingField("NFe/infNFe"))?;
            normalize_full(inf, xml, sequence_number)
        }
        "NFe" => {
            let inf = root
                .child("infNFe")
                .ok_or(DecodeError::MissingField("infNFe"))?;
            normalize_full(inf, xml, sequence_number)
        }
        other => Err(DecodeError::UnsupportedShape(other.to_string())),
    }
}

/// base64 → gunzip → UTF-8.
pub fn decompress(payload: &str) -> Result<String, DecodeError> {
    decompress_limited(payload, MAX_DOCUMENT_BYTES)
}

fn decompress_limited(payload: &str, limit: u64) -> Result<String, DecodeError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let compressed = STANDARD.decode(compact)?;

    let mut decoder = GzDecoder::new(compressed.as_slice()).take(limit + 1);
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes).map_err(DecodeError::Gzip)?;
    if bytes.len() as u64 > limit {
        return Err(DecodeError::TooLarge(limit));
    }
    Ok(String::from_utf8(bytes)?)
}

fn normalize_summary(
    root: &Element,
    raw_xml: String,
    sequence_number: Cursor,
) -> Result<NormalizedDocument, DecodeError> {
    let key = required(root, "chNFe")?;
    Ok(NormalizedDocument {
        kind: DocumentKind::Summary,
        access_key: AccessKey::new(key).map_err(|e| DecodeError::AccessKey(e.0))?,
        counterparty_name: required(root, "xNome")?.to_string(),
        counterparty_tax_id: tax_id(root)?.to_string(),
        total_value: amount(required(root, "vNF")?)?,
        issued_at: timestamp(required(root, "dhEmi")?)?,
        raw_xml,
        sequence_number,
    })
}

fn normalize_full(
    inf: &Element,
    raw_xml: String,
    sequence_number: Cursor,
) -> Result<NormalizedDocument, DecodeError> {
    let id = inf.attr("Id").ok_or(DecodeError::MissingField("infNFe/@Id"))?;
    let key = id
        .strip_prefix(FULL_ID_PREFIX)
        .ok_or_else(|| {
            DecodeError::AccessKey(format!("{id:?} lacks the {FULL_ID_PREFIX} prefix"))
        })?;
    let access_key = AccessKey::new(key).map_err(|e| DecodeError::AccessKey(e.0))?;

    let emit = inf.child("emit").ok_or(DecodeError::MissingField("emit"))?;
    let ide = inf.child("ide").ok_or(DecodeError::MissingField("ide"))?;
    let total = inf
        .path(&["total", "ICMSTot", "vNF"])
        .and_then(Element::text)
        .ok_or(DecodeError::MissingField("total/ICMSTot/vNF"))?;

    let issued_at = match (ide.child_text("dhEmi"), ide.child_text("dEmi")) {
        (Some(dh), _) => timestamp(dh)?,
        (None, Some(d)) => date_only(d)?,
        (None, None) => return Err(DecodeError::MissingField("ide/dhEmi")),
    };

    Ok(NormalizedDocument {
        kind: DocumentKind::Full,
        access_key,
        counterparty_name: required(emit, "xNome")?.to_string(),
        counterparty_tax_id: tax_id(emit)?.to_string(),
        total_value: amount(total)?,
        issued_at,
        raw_xml,
        sequence_number,
    })
}

fn required<'a>(el: &'a Element, name: &'static str) -> Result<&'a str, DecodeError> {
    el.child_text(name).ok_or(DecodeError::MissingField(name))
}

fn tax_id(el: &Element) -> Result<&str, DecodeError> {
    el.child_text("CNPJ")
        .or_else(|| el.child_text("CPF"))
        .ok_or(DecodeError::MissingField("CNPJ/CPF"))
}

fn amount(text: &str) -> Result<Decimal, DecodeError> {
    text.parse::<Decimal>()
        .map_err(|_| DecodeError::Amount(text.to_string()))
}

fn timestamp(text: &str) -> Result<DateTime<FixedOffset>, DecodeError> {
    DateTime::parse_from_rfc3339(text).map_err(|_| DecodeError::Timestamp(text.to_string()))
}

fn date_only(text: &str) -> Result<DateTime<FixedOffset>, DecodeError> {
    let bad = || DecodeError::Timestamp(text.to_string());
    let offset = FixedOffset::east_opt(DATE_ONLY_OFFSET_SECS).ok_or_else(bad)?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| bad())?
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(offset).single())
        .ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FULL_KEY, SUMMARY_KEY, full_xml, gzip_base64, summary_xml};

    fn raw(nsu: &str, payload: String) -> RawDocument {
        RawDocument {
            sequence_number: Some(nsu.into()),
            schema: None,
            compressed_payload: payload,
        }
    }

    #[test]
    fn gzip_base64_round_trip() {
        let xml = summary_xml(SUMMARY_KEY, "150.00");
        assert_eq!(decompress(&gzip_base64(&xml)).unwrap(), xml);
    }

    #[test]
    fn payload_whitespace_is_ignored() {
        let xml = summary_xml(SUMMARY_KEY, "1.00");
        let encoded = gzip_base64(&xml);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(20)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n  ");
        assert_eq!(decompress(&wrapped).unwrap(), xml);
    }

    #[test]
    fn decodes_summary() {
        let xml = summary_xml(SUMMARY_KEY, "150.00");
        let doc = decode_document(&raw("000000000000005", gzip_base64(&xml))).unwrap();
        assert_eq!(doc.kind, DocumentKind::Summary);
        assert_eq!(doc.access_key.as_str(), SUMMARY_KEY);
        assert_eq!(doc.counterparty_name, "FORNECEDOR EXEMPLO LTDA");
        assert_eq!(doc.counterparty_tax_id, "12345678000190");
        assert_eq!(doc.total_value, "150.00".parse::<Decimal>().unwrap());
        assert_eq!(doc.issued_at.to_rfc3339(), "2023-10-05T10:00:00-03:00");
        assert_eq!(doc.sequence_number.value(), 5);
        assert_eq!(doc.raw_xml, xml);
    }

    #[test]
    fn decodes_full_document_stripping_id_prefix() {
        let xml = full_xml(FULL_KEY, "2500.75");
        let doc = decode_document(&raw("6", gzip_base64(&xml))).unwrap();
        assert_eq!(doc.kind, DocumentKind::Full);
        assert_eq!(doc.access_key.as_str(), FULL_KEY);
        assert_eq!(doc.counterparty_name, "DISTRIBUIDORA & CIA");
        assert_eq!(doc.counterparty_tax_id, "98765432000110");
        assert_eq!(doc.total_value.to_string(), "2500.75");
        assert_eq!(doc.issued_at.to_rfc3339(), "2023-10-06T14:30:00-03:00");
        assert_eq!(doc.raw_xml, xml);
    }

    #[test]
    fn bare_nfe_root_is_full() {
        let xml = full_xml(FULL_KEY, "10.00");
        let start = xml.find("<NFe>").unwrap();
        let end = xml.find("</NFe>").unwrap() + "</NFe>".len();
        let bare = xml[start..end].to_string();
        let doc = decode_document(&raw("6", gzip_base64(&bare))).unwrap();
        assert_eq!(doc.kind, DocumentKind::Full);
        assert_eq!(doc.access_key.as_str(), FULL_KEY);
    }

    #[test]
    fn full_without_prefix_is_dropped() {
        let xml = full_xml(FULL_KEY, "10.00").replace(&format!("NFe{FULL_KEY}"), FULL_KEY);
        let err = decode_document(&raw("6", gzip_base64(&xml))).unwrap_err();
        assert!(matches!(err, DecodeError::AccessKey(_)), "{err}");
    }

    #[test]
    fn full_with_short_key_is_dropped() {
        let xml = full_xml(&FULL_KEY[..40], "10.00");
        let err = decode_document(&raw("6", gzip_base64(&xml))).unwrap_err();
        assert!(matches!(err, DecodeError::AccessKey(_)));
    }

    #[test]
    fn date_only_issue_date_falls_back() {
        let xml = full_xml(FULL_KEY, "10.00").replace(
            "<dhEmi>2023-10-06T14:30:00-03:00</dhEmi>",
            "<dEmi>2012-03-01</dEmi>",
        );
        let doc = decode_document(&raw("6", gzip_base64(&xml))).unwrap();
        assert_eq!(doc.issued_at.to_rfc3339(), "2012-03-01T00:00:00-03:00");
    }

    #[test]
    fn cpf_counterparty() {
        let xml = summary_xml(SUMMARY_KEY, "9.90")
            .replace("<CNPJ>12345678000190</CNPJ>", "<CPF>12345678909</CPF>");
        let doc = decode_document(&raw("1", gzip_base64(&xml))).unwrap();
        assert_eq!(doc.counterparty_tax_id, "12345678909");
    }

    fn failure(nsu: &str, payload: String) -> DecodeError {
        decode_document(&raw(nsu, payload)).unwrap_err()
    }

    #[test]
    fn failure_kinds() {
        let summary = |value: &str| summary_xml(SUMMARY_KEY, value);

        assert!(matches!(
            failure("1", "!!not base64!!".into()),
            DecodeError::Base64(_)
        ));
        assert!(matches!(
            failure("1", STANDARD.encode(b"plain, not gzip")),
            DecodeError::Gzip(_)
        ));
        assert!(matches!(
            failure("1", gzip_base64("<resNFe><chNFe>")),
            DecodeError::Xml(_)
        ));
        assert!(matches!(
            failure("1", gzip_base64("<resEvento><chNFe>1</chNFe></resEvento>")),
            DecodeError::UnsupportedShape(s) if s == "resEvento"
        ));
        let nameless = summary("1.00").replace("<xNome>FORNECEDOR EXEMPLO LTDA</xNome>", "");
        assert!(matches!(
            failure("1", gzip_base64(&nameless)),
            DecodeError::MissingField("xNome")
        ));
        assert!(matches!(
            failure("1", gzip_base64(&summary("cento e cinquenta"))),
            DecodeError::Amount(_)
        ));
        assert!(matches!(
            failure("x", gzip_base64(&summary("1.00"))),
            DecodeError::SequenceNumber(_)
        ));
    }

    #[test]
    fn missing_or_blank_nsu_is_dropped() {
        let payload = gzip_base64(&summary_xml(SUMMARY_KEY, "150.00"));
        let mut doc = raw("1", payload);

        doc.sequence_number = None;
        assert!(matches!(
            decode_document(&doc),
            Err(DecodeError::MissingField("docZip/@NSU"))
        ));

        doc.sequence_number = Some("  ".into());
        assert!(matches!(
            decode_document(&doc),
            Err(DecodeError::MissingField("docZip/@NSU"))
        ));

        let report = decode_batch(vec![doc]);
        assert!(report.documents.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].sequence_number.as_deref(), Some("  "));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let xml = "a".repeat(100);
        let payload = gzip_base64(&xml);
        assert_eq!(decompress_limited(&payload, 100).unwrap(), xml);
        assert!(matches!(
            decompress_limited(&payload, 99),
            Err(DecodeError::TooLarge(99))
        ));
    }

    #[test]
    fn bad_document_does_not_fail_batch() {
        let good = raw("5", gzip_base64(&summary_xml(SUMMARY_KEY, "150.00")));
        let corrupt = raw("4", STANDARD.encode(b"\x00\x01 corrupted"));
        let report = decode_batch(vec![corrupt, good]);

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].access_key.as_str(), SUMMARY_KEY);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].sequence_number.as_deref(), Some("4"));
        assert!(matches!(report.failures[0].error, DecodeError::Gzip(_)));
    }

    #[test]
    fn batch_preserves_input_order() {
        let batch = vec![
            raw("3", gzip_base64(&full_xml(FULL_KEY, "3.00"))),
            raw("1", "garbage".into()),
            raw("2", gzip_base64(&summary_xml(SUMMARY_KEY, "2.00"))),
        ];
        let report = decode_batch(batch);
        let nsus: Vec<u64> = report
            .documents
            .iter()
            .map(|d| d.sequence_number.value())
            .collect();
        assert_eq!(nsus, [3, 2]);
    }

    #[test]
    fn empty_batch() {
        let report = decode_batch(vec![]);
        assert!(report.documents.is_empty());
        assert!(report.failures.is_empty());
    }
}
