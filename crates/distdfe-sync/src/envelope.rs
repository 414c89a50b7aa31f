//! SOAP envelope codec for `nfeDistDFeInteresse`.
//!
//! Requests are rendered from a fixed SOAP 1.1 template. Responses have been
//! observed wrapped in more than one way, so parsing tries an explicit, ordered
//! list of [`SHAPES`] and reports [`DistError::MalformedEnvelope`] when none of
//! them match. Missing fields are never papered over with defaults, except the
//! two cursors which the authority leaves out on some rejections.

use distdfe_core::{Cursor, PollRequest};
use tracing::debug;

use crate::DistError;
use crate::xml::{Element, escape};

pub const SOAP11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSDL_NS: &str = "http://www.portalfiscal.inf.br/nfe/wsdl/NFeDistribuicaoDFe";
pub const NFE_NS: &str = "http://www.portalfiscal.inf.br/nfe";

/// Layout version of `distDFeInt` / `retDistDFeInt`.
pub const SCHEMA_VERSION: &str = "1.01";

/// Parsed `retDistDFeInt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResponse {
    pub status_code: String,
    pub status_message: String,
    pub last_cursor: Cursor,
    pub max_cursor: Cursor,
    pub batch: Vec<RawDocument>,
    /// `tpAmb` echoed by the authority.
    pub environment: Option<String>,
    /// `dhResp`, verbatim.
    pub responded_at: Option<String>,
}

/// One `docZip` entry, still compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// `NSU` attribute as received, `None` when absent. Validated when the
    /// document is decoded.
    pub sequence_number: Option<String>,
    /// `schema` attribute, e.g. `resNFe_v1.01.xsd`.
    pub schema: Option<String>,
    /// Base64 text of the gzip payload.
    pub compressed_payload: String,
}

/// Render the request envelope for one poll.
pub fn build_request(request: &PollRequest) -> Vec<u8> {
    let tax_tag = request.issuer_tax_id.element_name();
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope xmlns:soap="{soap}" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#,
            "<soap:Body>",
            r#"<nfeDistDFeInteresse xmlns="{wsdl}">"#,
            "<nfeDadosMsg>",
            r#"<distDFeInt xmlns="{nfe}" versao="{version}">"#,
            "<tpAmb>{tp_amb}</tpAmb>",
            "<cUFAutor>{uf}</cUFAutor>",
            "<{tax_tag}>{tax_id}</{tax_tag}>",
            "<distNSU><ultNSU>{cursor}</ultNSU></distNSU>",
            "</distDFeInt>",
            "</nfeDadosMsg>",
            "</nfeDistDFeInteresse>",
            "</soap:Body>",
            "</soap:Envelope>",
        ),
        soap = SOAP11_NS,
        wsdl = WSDL_NS,
        nfe = NFE_NS,
        version = SCHEMA_VERSION,
        tp_amb = request.environment.code(),
        uf = escape(&request.federated_unit_code),
        tax_tag = tax_tag,
        tax_id = escape(request.issuer_tax_id.as_str()),
        cursor = request.cursor.to_wire(),
    )
    .into_bytes()
}

/// A known way of wrapping `retDistDFeInt` inside the SOAP body.
pub struct Shape {
    pub name: &'static str,
    pub locate: fn(&Element) -> Option<&Element>,
}

/// Tried in order against the SOAP `Body`.
pub const SHAPES: &[Shape] = &[
    Shape {
        name: "response/result",
        locate: response_result,
    },
    Shape {
        name: "response",
        locate: response_only,
    },
    Shape {
        name: "flat",
        locate: flat,
    },
];

fn response_result(body: &Element) -> Option<&Element> {
    body.path(&[
        "nfeDistDFeInteresseResponse",
        "nfeDistDFeInteresseResult",
        "retDistDFeInt",
    ])
}

fn response_only(body: &Element) -> Option<&Element> {
    body.path(&["nfeDistDFeInteresseResponse", "retDistDFeInt"])
}

fn flat(body: &Element) -> Option<&Element> {
    body.child("retDistDFeInt")
}

/// Parse a raw response into a [`PollResponse`].
pub fn parse_response(raw: &[u8]) -> Result<PollResponse, DistError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| DistError::malformed(format!("response is not UTF-8: {e}")))?;
    let root = Element::parse(text)
        .map_err(|e| DistError::malformed(format!("response is not well-formed XML: {e}")))?;

    let body = soap_body(&root)?;

    if let Some(fault) = body.child("Fault") {
        return Err(DistError::malformed(format!(
            "SOAP fault: {}",
            fault_text(fault)
        )));
    }

    let (shape, ret) = SHAPES
        .iter()
        .find_map(|shape| (shape.locate)(body).map(|ret| (shape.name, ret)))
        .ok_or_else(|| {
            let found = body
                .children
                .first()
                .map(|c| c.name.as_str())
                .unwrap_or("nothing");
            DistError::malformed(format!(
                "no retDistDFeInt in any known layout (body contains <{found}>)"
            ))
        })?;
    debug!(shape, "located retDistDFeInt");

    read_ret(ret)
}

fn soap_body(root: &Element) -> Result<&Element, DistError> {
    let is_envelope =
        root.is("Envelope") && (root.in_namespace(SOAP11_NS) || root.in_namespace(SOAP12_NS));
    if !is_envelope {
        return Err(DistError::malformed(format!(
            "expected a SOAP Envelope, found <{}> in namespace {}",
            root.name,
            root.namespace.as_deref().unwrap_or("(none)")
        )));
    }
    root.child("Body")
        .ok_or_else(|| DistError::malformed("SOAP Envelope has no Body"))
}

/// `faultstring` (SOAP 1.1) or `Reason/Text` (SOAP 1.2).
fn fault_text(fault: &Element) -> String {
    fault
        .child_text("faultstring")
        .or_else(|| fault.path(&["Reason", "Text"]).and_then(Element::text))
        .unwrap_or("no fault description")
        .to_string()
}

fn read_ret(ret: &Element) -> Result<PollResponse, DistError> {
    let status_code = ret
        .child_text("cStat")
        .ok_or_else(|| DistError::malformed("retDistDFeInt has no cStat"))?
        .to_string();
    let status_message = ret.child_text("xMotivo").unwrap_or_default().to_string();
    let last_cursor = read_cursor(ret, "ultNSU")?;
    let max_cursor = read_cursor(ret, "maxNSU")?;
    match (last_cursor, max_cursor) {
        (Some(last), Some(max)) if last > max => {
            return Err(DistError::malformed(format!(
                "ultNSU {last} is beyond maxNSU {max}"
            )));
        }
        _ => {}
    }

    // A single docZip and a list of them come out the same way.
    let batch = ret
        .child("loteDistDFeInt")
        .map(|lote| {
            lote.children_named("docZip")
                .map(|doc| RawDocument {
                    sequence_number: doc.attr("NSU").map(str::to_string),
                    schema: doc.attr("schema").map(str::to_string),
                    compressed_payload: doc.text.trim().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(PollResponse {
        status_code,
        status_message,
        last_cursor: last_cursor.unwrap_or(Cursor::ZERO),
        max_cursor: max_cursor.unwrap_or(Cursor::ZERO),
        batch,
        environment: ret.child_text("tpAmb").map(str::to_string),
        responded_at: ret.child_text("dhResp").map(str::to_string),
    })
}

fn read_cursor(ret: &Element, name: &str) -> Result<Option<Cursor>, DistError> {
    ret.child_text(name)
        .map(|text| {
            text.parse()
                .map_err(|e| DistError::malformed(format!("{name}: {e}")))
        })
        .transpose()
}
