//! Builders for canned authority responses used by the unit tests.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::envelope::{NFE_NS, SOAP11_NS, SOAP12_NS, WSDL_NS};

pub const SUMMARY_KEY: &str = "43231012345678000190550010000012341000012345";
pub const FULL_KEY: &str = "43231098765432000110550010000099991000099990";

/// gzip then base64, the way `docZip` payloads travel.
pub fn gzip_base64(xml: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes()).unwrap();
    STANDARD.encode(encoder.finish().unwrap())
}

pub fn summary_xml(key: &str, value: &str) -> String {
    format!(
        r#"<resNFe xmlns="{NFE_NS}" versao="1.01"><chNFe>{key}</chNFe><CNPJ>12345678000190</CNPJ><xNome>FORNECEDOR EXEMPLO LTDA</xNome><IE>0960000000</IE><dhEmi>2023-10-05T10:00:00-03:00</dhEmi><tpNF>1</tpNF><vNF>{value}</vNF><digVal>abc=</digVal><dhRecbto>2023-10-05T10:01:00-03:00</dhRecbto><nProt>143230000000001</nProt><cSitNFe>1</cSitNFe></resNFe>"#
    )
}

pub fn full_xml(key: &str, value: &str) -> String {
    format!(
        r#"<nfeProc xmlns="{NFE_NS}" versao="4.00"><NFe><infNFe Id="NFe{key}" versao="4.00"><ide><cUF>43</cUF><nNF>9999</nNF><dhEmi>2023-10-06T14:30:00-03:00</dhEmi></ide><emit><CNPJ>98765432000110</CNPJ><xNome>DISTRIBUIDORA &amp; CIA</xNome></emit><dest><CNPJ>12345678000190</CNPJ></dest><total><ICMSTot><vProd>{value}</vProd><vNF>{value}</vNF></ICMSTot></total></infNFe></NFe><protNFe versao="4.00"><infProt><chNFe>{key}</chNFe><cStat>100</cStat></infProt></protNFe></nfeProc>"#
    )
}

/// A `retDistDFeInt` element. `None` cursors are left out.
pub fn ret_dist(
    code: &str,
    message: &str,
    last: Option<&str>,
    max: Option<&str>,
    docs: &[(&str, &str)],
) -> String {
    let mut xml = format!(
        r#"<retDistDFeInt xmlns="{NFE_NS}" versao="1.01"><tpAmb>1</tpAmb><verAplic>1.7.6</verAplic><cStat>{code}</cStat><xMotivo>{message}</xMotivo><dhResp>2023-10-05T10:00:00-03:00</dhResp>"#
    );
    if let Some(last) = last {
        xml.push_str(&format!("<ultNSU>{last}</ultNSU>"));
    }
    if let Some(max) = max {
        xml.push_str(&format!("<maxNSU>{max}</maxNSU>"));
    }
    if !docs.is_empty() {
        xml.push_str("<loteDistDFeInt>");
        for (nsu, payload) in docs {
            xml.push_str(&format!(
                r#"<docZip NSU="{nsu}" schema="resNFe_v1.01.xsd">{payload}</docZip>"#
            ));
        }
        xml.push_str("</loteDistDFeInt>");
    }
    xml.push_str("</retDistDFeInt>");
    xml
}

#[derive(Debug, Clone, Copy)]
pub enum Envelope {
    Soap11,
    Soap12,
}

impl Envelope {
    /// Wrap `ret` in the body layout named after an entry of `envelope::SHAPES`.
    pub fn wrap(self, shape: &str, ret: &str) -> String {
        let body = match shape {
            "response/result" => format!(
                r#"<nfeDistDFeInteresseResponse xmlns="{WSDL_NS}"><nfeDistDFeInteresseResult>{ret}</nfeDistDFeInteresseResult></nfeDistDFeInteresseResponse>"#
            ),
            "response" => format!(
                r#"<nfeDistDFeInteresseResponse xmlns="{WSDL_NS}">{ret}</nfeDistDFeInteresseResponse>"#
            ),
            "flat" => ret.to_string(),
            other => panic!("no fixture for shape {other}"),
        };
        let (prefix, ns) = match self {
            Self::Soap11 => ("soap", SOAP11_NS),
            Self::Soap12 => ("soap12", SOAP12_NS),
        };
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?><{prefix}:Envelope xmlns:{prefix}="{ns}" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><{prefix}:Body>{body}</{prefix}:Body></{prefix}:Envelope>"#
        )
    }
}
