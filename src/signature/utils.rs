//! XML processing helpers for the signer: element location, the
//! enveloped-signature transform, and canonicalization.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use xml_c14n::{self, CanonicalizationOptions};

use super::SignError;
use super::constants::{ID_ATTRIBUTE, SIGNATURE_ELEMENT};

/// Byte span of a located element, plus its `Id` attribute.
pub(super) struct TargetElement {
    pub start: usize,
    /// Offset where the closing tag begins.
    pub close_start: usize,
    /// Offset one past the closing tag.
    pub end: usize,
    pub id: Option<String>,
    /// Whether the element is the document root.
    pub is_root: bool,
    /// Namespace declarations in scope at the element's start tag that the
    /// tag itself does not redeclare, attribute name to URI, outermost
    /// first. Inclusive C14N of the element in document context renders
    /// these on the element, so a fragment extracted for digesting must
    /// carry them too.
    pub inherited_namespaces: Vec<(String, String)>,
}

/// Finds the first element named `name` and returns its exact byte span.
///
/// Matching end tags are paired by depth, so same-named nested children do
/// not cut the span short.
pub(super) fn locate_element(xml: &str, name: &str) -> Result<Option<TargetElement>, SignError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut first_element: Option<usize> = None;
    let mut ns_stack: Vec<Vec<(String, String)>> = Vec::new();
    let mut found: Option<(usize, usize, Option<String>, Vec<(String, String)>)> = None;

    loop {
        let event_start = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if first_element.is_none() {
                    first_element = Some(event_start);
                }
                let own_namespaces = namespace_declarations(&e)?;
                if found.is_none() && e.name().as_ref() == name.as_bytes() {
                    let id = read_id_attribute(&e)?;
                    let inherited = in_scope_namespaces(&ns_stack, &own_namespaces);
                    found = Some((event_start, depth, id, inherited));
                }
                ns_stack.push(own_namespaces);
                depth += 1;
            }
            Ok(Event::End(e)) => {
                depth -= 1;
                ns_stack.pop();
                if let Some((start, target_depth, ref id, ref inherited)) = found
                    && depth == target_depth
                    && e.name().as_ref() == name.as_bytes()
                {
                    return Ok(Some(TargetElement {
                        start,
                        close_start: event_start,
                        end: reader.buffer_position() as usize,
                        id: id.clone(),
                        is_root: first_element == Some(start),
                        inherited_namespaces: inherited.clone(),
                    }));
                }
            }
            Ok(Event::Empty(e)) => {
                if first_element.is_none() {
                    first_element = Some(event_start);
                }
                if found.is_none() && e.name().as_ref() == name.as_bytes() {
                    let end = reader.buffer_position() as usize;
                    let own_namespaces = namespace_declarations(&e)?;
                    return Ok(Some(TargetElement {
                        start: event_start,
                        close_start: end,
                        end,
                        id: read_id_attribute(&e)?,
                        is_root: first_element == Some(event_start),
                        inherited_namespaces: in_scope_namespaces(&ns_stack, &own_namespaces),
                    }));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => {
                return Err(SignError::CanonicalizationFailure(format!(
                    "malformed XML: {e}"
                )));
            }
        }
    }
}

/// Namespace declarations (`xmlns`, `xmlns:prefix`) carried by a start tag.
fn namespace_declarations(element: &BytesStart) -> Result<Vec<(String, String)>, SignError> {
    let mut declarations = Vec::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| {
            SignError::CanonicalizationFailure(format!("malformed attribute: {e}"))
        })?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            let value = attr.unescape_value().map_err(|e| {
                SignError::CanonicalizationFailure(format!("malformed attribute value: {e}"))
            })?;
            declarations.push((
                String::from_utf8_lossy(key).into_owned(),
                value.into_owned(),
            ));
        }
    }
    Ok(declarations)
}

/// Flattens the ancestor declaration stack into the bindings visible at an
/// element, innermost redeclaration winning, minus anything the element
/// declares itself.
fn in_scope_namespaces(
    ns_stack: &[Vec<(String, String)>],
    own: &[(String, String)],
) -> Vec<(String, String)> {
    let mut in_scope: Vec<(String, String)> = Vec::new();
    for declarations in ns_stack {
        for (name, uri) in declarations {
            if let Some(existing) = in_scope.iter_mut().find(|(n, _)| n == name) {
                existing.1 = uri.clone();
            } else {
                in_scope.push((name.clone(), uri.clone()));
            }
        }
    }
    in_scope.retain(|(name, _)| !own.iter().any(|(n, _)| n == name));
    in_scope
}

/// Redeclares inherited namespace bindings on an extracted fragment's start
/// tag, so standalone canonicalization of the fragment produces the same
/// bytes as canonicalizing the element inside its document.
pub(super) fn apply_inherited_namespaces(
    fragment: &str,
    inherited: &[(String, String)],
) -> String {
    if inherited.is_empty() {
        return fragment.to_string();
    }

    let insert_at = fragment
        .char_indices()
        .skip(1)
        .find(|(_, c)| matches!(c, ' ' | '\t' | '\r' | '\n' | '/' | '>'))
        .map_or(fragment.len(), |(i, _)| i);

    let mut declarations = String::new();
    for (name, uri) in inherited {
        declarations.push_str(&format!(
            " {name}=\"{}\"",
            quick_xml::escape::escape(uri.as_str())
        ));
    }

    let mut result = String::with_capacity(fragment.len() + declarations.len());
    result.push_str(&fragment[..insert_at]);
    result.push_str(&declarations);
    result.push_str(&fragment[insert_at..]);
    result
}

fn read_id_attribute(element: &BytesStart) -> Result<Option<String>, SignError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| {
            SignError::CanonicalizationFailure(format!("malformed attribute: {e}"))
        })?;
        if attr.key.as_ref() == ID_ATTRIBUTE.as_bytes() {
            let value = attr.unescape_value().map_err(|e| {
                SignError::CanonicalizationFailure(format!("malformed attribute value: {e}"))
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn is_element_start(s: &str, name: &str) -> bool {
    s.strip_prefix('<')
        .and_then(|rest| rest.strip_prefix(name))
        .is_some_and(|rest| rest.starts_with([' ', '\t', '\n', '>', '/']))
}

/// Enveloped-signature transform: strips existing `Signature` elements so
/// they never enter the digest.
pub(super) fn remove_signature_blocks(xml: &str) -> String {
    let close_tag = format!("</{SIGNATURE_ELEMENT}>");
    let mut result = xml.to_string();

    loop {
        let Some(start) = result
            .match_indices('<')
            .map(|(i, _)| i)
            .find(|&i| is_element_start(&result[i..], SIGNATURE_ELEMENT))
        else {
            break;
        };

        let mut depth = 0usize;
        let mut pos = start;
        let mut removed = false;
        while let Some(offset) = result[pos..].find('<') {
            pos += offset;
            if is_element_start(&result[pos..], SIGNATURE_ELEMENT) {
                depth += 1;
            } else if result[pos..].starts_with(&close_tag) {
                depth -= 1;
                if depth == 0 {
                    result.replace_range(start..pos + close_tag.len(), "");
                    removed = true;
                    break;
                }
            }
            pos += 1;
        }
        if !removed {
            break;
        }
    }

    result
}

/// Inclusive C14N over the given XML.
pub(super) fn canonicalize(xml: &str) -> Result<String, SignError> {
    let options = CanonicalizationOptions::default();
    xml_c14n::canonicalize_xml(xml, options)
        .map_err(|e| SignError::CanonicalizationFailure(e.to_string()))
}

/// Structural containment check: is any `Signature` element a descendant of
/// the element named `name`?
pub(super) fn signature_inside_element(xml: &str, name: &str) -> Result<bool, SignError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut target_depth: Option<usize> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if target_depth.is_some() && e.name().as_ref() == SIGNATURE_ELEMENT.as_bytes() {
                    return Ok(true);
                }
                if target_depth.is_none() && e.name().as_ref() == name.as_bytes() {
                    target_depth = Some(depth);
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                depth -= 1;
                if target_depth == Some(depth) {
                    target_depth = None;
                }
            }
            Ok(Event::Empty(e)) => {
                if target_depth.is_some() && e.name().as_ref() == SIGNATURE_ELEMENT.as_bytes() {
                    return Ok(true);
                }
            }
            Ok(Event::Eof) => return Ok(false),
            Ok(_) => {}
            Err(e) => {
                return Err(SignError::CanonicalizationFailure(format!(
                    "malformed XML: {e}"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_element_span_and_id() {
        let xml = r#"<DPS><infDPS Id="ABC"><tpAmb>2</tpAmb></infDPS></DPS>"#;
        let target = locate_element(xml, "infDPS")
            .expect("well-formed XML")
            .expect("element present");

        assert_eq!(&xml[target.start..target.end], r#"<infDPS Id="ABC"><tpAmb>2</tpAmb></infDPS>"#);
        assert_eq!(target.id.as_deref(), Some("ABC"));
        assert!(!target.is_root);
        assert!(xml[target.close_start..].starts_with("</infDPS>"));
    }

    #[test]
    fn root_element_is_flagged() {
        let xml = r#"<DPS Id="X"><info>A</info></DPS>"#;
        let target = locate_element(xml, "DPS")
            .expect("well-formed XML")
            .expect("element present");

        assert!(target.is_root);
    }

    #[test]
    fn tracks_namespaces_inherited_from_ancestors() {
        let xml = r#"<DPS xmlns="urn:nfse"><infDPS Id="A"><v>1</v></infDPS></DPS>"#;
        let target = locate_element(xml, "infDPS")
            .expect("well-formed XML")
            .expect("element present");

        assert_eq!(
            target.inherited_namespaces,
            vec![("xmlns".to_string(), "urn:nfse".to_string())]
        );
    }

    #[test]
    fn element_redeclaring_a_namespace_inherits_nothing_for_it() {
        let xml = r#"<DPS xmlns="urn:outer" xmlns:x="urn:x"><infDPS xmlns="urn:inner" Id="A"/></DPS>"#;
        let target = locate_element(xml, "infDPS")
            .expect("well-formed XML")
            .expect("element present");

        assert_eq!(
            target.inherited_namespaces,
            vec![("xmlns:x".to_string(), "urn:x".to_string())]
        );
    }

    #[test]
    fn root_element_inherits_no_namespaces() {
        let xml = r#"<DPS xmlns="urn:nfse" Id="X"><v>1</v></DPS>"#;
        let target = locate_element(xml, "DPS")
            .expect("well-formed XML")
            .expect("element present");

        assert!(target.inherited_namespaces.is_empty());
    }

    #[test]
    fn canonical_fragment_carries_the_inherited_namespace() {
        let xml = r#"<DPS xmlns="urn:nfse"><infDPS Id="A"><v>1</v></infDPS></DPS>"#;
        let target = locate_element(xml, "infDPS")
            .expect("well-formed XML")
            .expect("element present");

        let fragment = apply_inherited_namespaces(
            &xml[target.start..target.end],
            &target.inherited_namespaces,
        );
        assert!(fragment.starts_with(r#"<infDPS xmlns="urn:nfse""#));

        let canonical = canonicalize(&fragment).expect("canonicalize fragment");
        assert!(canonical.contains(r#"xmlns="urn:nfse""#));
    }

    #[test]
    fn missing_element_is_none() {
        let xml = "<DPS><info>A</info></DPS>";
        assert!(locate_element(xml, "infDPS").expect("well-formed XML").is_none());
    }

    #[test]
    fn removes_signature_but_not_similarly_named_elements() {
        let xml = concat!(
            "<DPS><infDPS Id=\"A\"><v>1</v></infDPS>",
            "<Signature xmlns=\"x\"><SignatureValue>s</SignatureValue></Signature></DPS>",
        );
        let stripped = remove_signature_blocks(xml);

        assert_eq!(stripped, "<DPS><infDPS Id=\"A\"><v>1</v></infDPS></DPS>");
    }

    #[test]
    fn containment_check_sees_through_structure() {
        let nested = r#"<DPS Id="X"><Signature>s</Signature></DPS>"#;
        let sibling = r#"<root><DPS Id="X"/><Signature>s</Signature></root>"#;

        assert!(signature_inside_element(nested, "DPS").expect("well-formed"));
        assert!(!signature_inside_element(sibling, "DPS").expect("well-formed"));
    }
}
