//! Minimal SOAP 1.1 envelope encoding and response scanning.
//!
//! The controller exposes a JAX-WS style endpoint: request arguments are
//! positional (`arg0`, `arg1`, ...) and list results come back as repeated
//! `<return>` elements whose children are flat text fields.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// SOAP 1.1 envelope namespace.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Matches a `<return>` element (optionally prefixed) and captures its body.
static RETURN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w.-]+:)?return(?:\s[^>]*)?>(.*?)</(?:[\w.-]+:)?return\s*>")
        .expect("Invalid regex pattern")
});

/// Matches a leaf element. Captures the local name, the attributes, and
/// either CDATA content or plain text. Self-closing leaves match with neither.
static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"<(?:[\w.-]+:)?([A-Za-z_][\w.-]*)(\s[^>]*?)?(?:/>|>(?:<!\[CDATA\[(?s:(.*?))\]\]>|([^<]*))</)",
    )
    .expect("Invalid regex pattern")
});

/// Matches an `xsi:nil="true"` attribute.
static NIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|\s)(?:[\w.-]+:)?nil\s*=\s*["'](?:true|1)["']"#)
        .expect("Invalid regex pattern")
});

/// Matches the fault string of a SOAP fault.
static FAULT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[\w.-]+:)?faultstring(?:\s[^>]*)?>(.*?)</(?:[\w.-]+:)?faultstring\s*>")
        .expect("Invalid regex pattern")
});

/// Escapes text for inclusion in XML character data.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decodes the predefined XML entities and numeric character references
/// (`&#38;`, `&#x26;`). Unknown or malformed references are kept verbatim.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .and_then(|end| decode_reference(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_nil(field: &regex::Captures<'_>) -> bool {
    field
        .get(2)
        .map_or(false, |attrs| NIL_RE.is_match(attrs.as_str()))
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => name.strip_prefix('#')?.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Builds the request envelope for `operation` with positional arguments.
pub fn build_envelope(namespace: &str, operation: &str, args: &[String]) -> String {
    let mut body = String::new();
    for (i, arg) in args.iter().enumerate() {
        body.push_str(&format!("<arg{i}>{}</arg{i}>", escape(arg)));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soapenv:Envelope xmlns:soapenv=\"{SOAP_ENV_NS}\" xmlns:vnc=\"{ns}\">\
         <soapenv:Header/>\
         <soapenv:Body><vnc:{op}>{body}</vnc:{op}></soapenv:Body>\
         </soapenv:Envelope>",
        ns = escape(namespace),
        op = operation,
    )
}

/// Returns the fault string if the response is a SOAP fault.
pub fn parse_fault(response: &str) -> Option<String> {
    FAULT_RE
        .captures(response)
        .map(|caps| unescape(caps[1].trim()))
}

/// Returns the leaf fields of every `<return>` element, in document order.
///
/// CDATA content is taken verbatim and text content is trimmed and unescaped.
/// A self-closing leaf yields an empty value. A leaf marked `xsi:nil` is left
/// out. Nested elements are flattened into the same map, so this only suits
/// the flat records the controller returns.
pub fn parse_return_items(response: &str) -> Vec<HashMap<String, String>> {
    RETURN_RE
        .captures_iter(response)
        .map(|item| {
            FIELD_RE
                .captures_iter(&item[1])
                .filter(|field| !is_nil(field))
                .map(|field| {
                    let value = match (field.get(3), field.get(4)) {
                        (Some(cdata), _) => cdata.as_str().to_string(),
                        (None, Some(text)) => unescape(text.as_str().trim()),
                        (None, None) => String::new(),
                    };
                    (field[1].to_string(), value)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_roundtrip() {
        let text = r#"a<b>&"c'"#;
        assert_eq!(escape(text), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(unescape(&escape(text)), text);
        // &amp;lt; must decode to the literal text "&lt;"
        assert_eq!(unescape("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_build_envelope() {
        let env = build_envelope(
            "http://vnc.example/",
            "setServerPort",
            &["00:01".to_string(), "3".to_string(), "abc".to_string()],
        );
        assert!(env.contains("xmlns:vnc=\"http://vnc.example/\""));
        assert!(env.contains(
            "<vnc:setServerPort><arg0>00:01</arg0><arg1>3</arg1><arg2>abc</arg2></vnc:setServerPort>"
        ));
    }

    #[test]
    fn test_build_envelope_without_args() {
        let env = build_envelope("urn:vnc", "save", &[]);
        assert!(env.contains("<vnc:save></vnc:save>"));
    }

    #[test]
    fn test_parse_fault() {
        let response = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
            <S:Body><S:Fault><faultcode>S:Server</faultcode>
            <faultstring>region &quot;abc&quot; not found</faultstring></S:Fault></S:Body></S:Envelope>"#;
        assert_eq!(parse_fault(response), Some("region \"abc\" not found".to_string()));
        assert_eq!(parse_fault("<S:Envelope/>"), None);
    }

    #[test]
    fn test_parse_return_items() {
        let response = r#"<S:Envelope><S:Body><ns2:showPortsResponse xmlns:ns2="urn:vnc">
            <return><portNumber>1</portNumber><regionName>abc</regionName><type>ServerPort</type></return>
            <return><portNumber>48</portNumber><type>OuterPort</type></return>
            </ns2:showPortsResponse></S:Body></S:Envelope>"#;

        let items = parse_return_items(response);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["regionName"], "abc");
        assert_eq!(items[0]["type"], "ServerPort");
        assert_eq!(items[1]["portNumber"], "48");
        assert!(!items[1].contains_key("regionName"));
    }

    #[test]
    fn test_unescape_numeric_references() {
        assert_eq!(unescape("a&#38;b&#x3C;c&#X3e;"), "a&b<c>");
        assert_eq!(unescape("caf&#233;"), "café");
        // Malformed or unknown references pass through
        assert_eq!(unescape("&#xZZ; &nbsp; & done"), "&#xZZ; &nbsp; & done");
    }

    #[test]
    fn test_parse_cdata_and_empty_leaves() {
        let response = r#"<S:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><S:Body>
            <return><regionName><![CDATA[a<b>&c]]></regionName><portNumber/><type xsi:nil="true"/></return>
            <return><regionName xsi:nil="true"></regionName><dpid>0x&#49;</dpid></return>
            </S:Body></S:Envelope>"#;

        let items = parse_return_items(response);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["regionName"], "a<b>&c");
        assert_eq!(items[0]["portNumber"], "");
        assert!(!items[0].contains_key("type"));
        assert!(!items[1].contains_key("regionName"));
        assert_eq!(items[1]["dpid"], "0x1");
    }

    #[test]
    fn test_parse_empty_list() {
        let response = "<S:Envelope><S:Body><ns2:showRegionResponse/></S:Body></S:Envelope>";
        assert!(parse_return_items(response).is_empty());
    }
}
