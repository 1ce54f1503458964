//
// features/declaration.rs
//
// Go to declaration of keyword calls and imports
//

use std::sync::Arc;

use tower_lsp::lsp_types::request::GotoDeclarationResponse;
use tower_lsp::lsp_types::{Location, LocationLink, Position, Range, Url};

use super::{AnalyzedDocument, FeatureBus, PositionRequest, Services};
use crate::bus::HandlerDescriptor;
use crate::classifier::call_at;
use crate::document_store::DocumentStore;
use crate::library_doc::{KeywordDoc, KeywordSource};
use crate::syntax::{StatementKind, TokenKind};
use crate::utf16::{self, CharPosition, CharRange};
use crate::ROBOT_LANGUAGE_ID;

fn keyword_target(doc: &AnalyzedDocument, keyword: &KeywordDoc) -> Option<Url> {
    if keyword.kind == KeywordSource::Local {
        return Some(doc.uri().clone());
    }
    keyword
        .source
        .as_deref()
        .and_then(|path| Url::from_file_path(path).ok())
}

/// Range of the keyword name on its definition line, in wire units.
///
/// Only documents in the store are inspected; anything else gets an empty
/// range at the start of the line.
fn definition_range(documents: &DocumentStore, uri: &Url, keyword: &KeywordDoc) -> Range {
    let line = keyword.line.unwrap_or(0) as usize;
    match documents.get(uri) {
        Some(target) => {
            let len = target
                .line(line)
                .filter(|text| text.starts_with(keyword.name.as_str()))
                .map_or(0, |_| keyword.name.chars().count());
            utf16::range_to_wire(&target.rope, CharRange::on_line(line, 0, len))
        }
        None => {
            let start = Position::new(line as u32, 0);
            Range::new(start, start)
        }
    }
}

fn import_target(doc: &AnalyzedDocument, pos: CharPosition) -> Option<Location> {
    let statement = doc.statement_at(pos)?;
    let token = statement.token_at(pos).filter(|t| t.kind == TokenKind::Name)?;
    let range = token.range();
    let start_of_file = Range::default();
    match statement.kind {
        StatementKind::LibraryImport => {
            let entry = doc
                .namespace
                .libraries()
                .iter()
                .find(|lib| lib.explicit && &lib.source_uri == doc.uri() && lib.range == range)?;
            let catalog = entry.catalog.as_ref().ok()?;
            let uri = Url::from_file_path(catalog.source.as_deref()?).ok()?;
            Some(Location::new(uri, start_of_file))
        }
        StatementKind::ResourceImport => {
            let entry = doc
                .namespace
                .resources()
                .iter()
                .find(|res| &res.source_uri == doc.uri() && res.range == range)?;
            Some(Location::new(entry.uri.clone()?, start_of_file))
        }
        _ => None,
    }
}

/// Declaration of whatever is under `pos`.
///
/// Keyword calls produce links, import names produce plain locations.
pub fn declaration(
    documents: &DocumentStore,
    doc: &AnalyzedDocument,
    pos: CharPosition,
) -> Option<GotoDeclarationResponse> {
    if let Some(location) = import_target(doc, pos) {
        return Some(GotoDeclarationResponse::Scalar(location));
    }

    let statement = doc.statement_at(pos)?;
    let call = call_at(&doc.namespace, statement, pos.line, pos.column)?;
    let keyword = call.keyword.as_ref()?;
    let target_uri = keyword_target(doc, keyword)?;
    let target_range = definition_range(documents, &target_uri, keyword);
    Some(GotoDeclarationResponse::Link(vec![LocationLink {
        origin_selection_range: Some(utf16::range_to_wire(&doc.snapshot.rope, call.token.range())),
        target_uri,
        target_range,
        target_selection_range: target_range,
    }]))
}

/// Merge handler results for a client with or without link support.
///
/// Links are downgraded to their target location when the client cannot take
/// them, or when they would be mixed with plain locations.
pub fn merge_responses(
    responses: Vec<GotoDeclarationResponse>,
    link_support: bool,
) -> Option<GotoDeclarationResponse> {
    let mut locations = Vec::new();
    let mut links = Vec::new();
    for response in responses {
        match response {
            GotoDeclarationResponse::Scalar(location) => locations.push(location),
            GotoDeclarationResponse::Array(more) => locations.extend(more),
            GotoDeclarationResponse::Link(more) => links.extend(more),
        }
    }

    if links.is_empty() {
        return match locations.len() {
            0 => None,
            1 => locations.pop().map(GotoDeclarationResponse::Scalar),
            _ => Some(GotoDeclarationResponse::Array(locations)),
        };
    }
    if link_support && locations.is_empty() {
        return Some(GotoDeclarationResponse::Link(links));
    }

    if link_support {
        log::warn!("Mixed Location and LocationLink declaration results, returning locations");
    } else {
        log::warn!("Client does not support declaration links, returning locations");
    }
    locations.extend(
        links
            .into_iter()
            .map(|link| Location::new(link.target_uri, link.target_range)),
    );
    match locations.len() {
        1 => locations.pop().map(GotoDeclarationResponse::Scalar),
        _ => Some(GotoDeclarationResponse::Array(locations)),
    }
}

pub fn register(bus: &mut FeatureBus, services: &Arc<Services>) {
    let services = Arc::clone(services);
    bus.declaration.register(
        HandlerDescriptor::new("declaration").languages([ROBOT_LANGUAGE_ID]),
        move |req: PositionRequest| {
            let services = Arc::clone(&services);
            async move { anyhow::Ok(declaration(services.documents(), &req.document, req.position)) }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::{build_namespace_in, parse, test_uri, StaticIntrospector};

    fn analyzed(store: &DocumentStore, text: &str) -> AnalyzedDocument {
        let uri = test_uri("suite.robot");
        store.open(&uri, ROBOT_LANGUAGE_ID, text, 1);
        AnalyzedDocument {
            snapshot: store.snapshot(&uri).unwrap(),
            model: parse(text),
            namespace: Arc::new(build_namespace_in(store, &StaticIntrospector::new(), &uri)),
        }
    }

    const SUITE: &str = "*** Test Cases ***\nT\n    Run Keyword    Helper\n*** Keywords ***\nHelper\n    No Operation\n";

    #[test]
    fn test_inner_call_links_to_local_definition() {
        let store = DocumentStore::new();
        let doc = analyzed(&store, SUITE);
        let response = declaration(&store, &doc, CharPosition::new(2, 22)).unwrap();
        let GotoDeclarationResponse::Link(links) = response else {
            panic!("expected links");
        };
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_uri, test_uri("suite.robot"));
        assert_eq!(links[0].target_range, Range::new(Position::new(4, 0), Position::new(4, 6)));
        assert_eq!(
            links[0].origin_selection_range,
            Some(Range::new(Position::new(2, 19), Position::new(2, 25)))
        );
    }

    #[test]
    fn test_unresolved_call_has_no_declaration() {
        let store = DocumentStore::new();
        let doc = analyzed(&store, "*** Test Cases ***\nT\n    Nowhere\n");
        assert!(declaration(&store, &doc, CharPosition::new(2, 6)).is_none());
    }

    #[test]
    fn test_resource_import_declaration() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("common.resource"), "*** Keywords ***\nShared\n    No Operation\n").unwrap();
        let uri = Url::from_file_path(dir.path().join("suite.robot")).unwrap();
        let text = "*** Settings ***\nResource    common.resource\n";
        let store = DocumentStore::new();
        store.open(&uri, ROBOT_LANGUAGE_ID, text, 1);
        let doc = AnalyzedDocument {
            snapshot: store.snapshot(&uri).unwrap(),
            model: parse(text),
            namespace: Arc::new(build_namespace_in(&store, &StaticIntrospector::new(), &uri)),
        };
        let Some(GotoDeclarationResponse::Scalar(location)) = declaration(&store, &doc, CharPosition::new(1, 14)) else {
            panic!("expected a location");
        };
        assert_eq!(location.uri, Url::from_file_path(dir.path().join("common.resource")).unwrap());
    }

    fn link(uri: &str) -> LocationLink {
        let target = Range::new(Position::new(3, 0), Position::new(3, 5));
        LocationLink {
            origin_selection_range: None,
            target_uri: Url::parse(uri).unwrap(),
            target_range: target,
            target_selection_range: target,
        }
    }

    #[test]
    fn test_links_kept_with_link_support() {
        let merged = merge_responses(vec![GotoDeclarationResponse::Link(vec![link("file:///a.robot")])], true);
        assert!(matches!(merged, Some(GotoDeclarationResponse::Link(links)) if links.len() == 1));
    }

    #[test]
    fn test_links_downgraded_without_link_support() {
        let merged = merge_responses(vec![GotoDeclarationResponse::Link(vec![link("file:///a.robot")])], false);
        let Some(GotoDeclarationResponse::Scalar(location)) = merged else {
            panic!("expected a single location");
        };
        assert_eq!(location.uri.as_str(), "file:///a.robot");
        assert_eq!(location.range, Range::new(Position::new(3, 0), Position::new(3, 5)));
    }

    #[test]
    fn test_mixed_results_become_locations() {
        let plain = Location::new(Url::parse("file:///b.robot").unwrap(), Range::default());
        let merged = merge_responses(
            vec![
                GotoDeclarationResponse::Scalar(plain),
                GotoDeclarationResponse::Link(vec![link("file:///a.robot")]),
            ],
            true,
        );
        assert!(matches!(merged, Some(GotoDeclarationResponse::Array(locations)) if locations.len() == 2));
        assert!(merge_responses(Vec::new(), true).is_none());
    }
}
