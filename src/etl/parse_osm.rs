use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::data::{ChangeKind, ChangesetHeader, Element, ElementType, Member, OsmId, Tags};
use crate::errors::{Error, Result};

/// Everything found in one OSM API document: `<osm>` element lists,
/// `<osmChange>` blocks and `<changeset>` headers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OsmDocument {
    pub changeset: Option<ChangesetHeader>,
    pub blocks: Vec<(ChangeKind, Vec<Element>)>,
    pub elements: Vec<Element>,
}

struct ElementBuilder {
    element_type: ElementType,
    id: Option<OsmId>,
    version: Option<u64>,
    tags: Tags,
    nd: Vec<OsmId>,
    members: Vec<Member>,
}

impl ElementBuilder {
    fn from_start(element_type: ElementType, el: &BytesStart) -> Result<Self> {
        let mut builder = ElementBuilder {
            element_type,
            id: None,
            version: None,
            tags: Tags::new(),
            nd: Vec::new(),
            members: Vec::new(),
        };
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            match attribute.key.as_ref() {
                b"id" => builder.id = Some(attribute.unescape_value()?.parse()?),
                b"version" => builder.version = Some(attribute.unescape_value()?.parse()?),
                _ => (),
            }
        }
        Ok(builder)
    }

    fn add_tag(&mut self, el: &BytesStart) -> Result<()> {
        let mut key: Option<String> = None;
        let mut value: Option<String> = None;
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            match attribute.key.as_ref() {
                b"k" => key = Some(attribute.unescape_value()?.into_owned()),
                b"v" => value = Some(attribute.unescape_value()?.into_owned()),
                _ => (),
            }
        }
        match (key, value) {
            (Some(k), Some(v)) => {
                self.tags.insert(k, v);
                Ok(())
            }
            _ => Err(self.malformed("tag without k or v")),
        }
    }

    fn add_nd(&mut self, el: &BytesStart) -> Result<()> {
        let node_ref =
            attribute_value(el, b"ref")?.ok_or_else(|| self.malformed("nd without ref"))?;
        self.nd.push(node_ref.parse()?);
        Ok(())
    }

    fn add_member(&mut self, el: &BytesStart) -> Result<()> {
        let mut member_type: Option<ElementType> = None;
        let mut id: Option<OsmId> = None;
        let mut role = String::new();
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            match attribute.key.as_ref() {
                b"type" => member_type = Some(attribute.unescape_value()?.parse()?),
                b"ref" => id = Some(attribute.unescape_value()?.parse()?),
                b"role" => role = attribute.unescape_value()?.into_owned(),
                _ => (),
            }
        }
        match (member_type, id) {
            (Some(member_type), Some(id)) => {
                self.members.push(Member { member_type, id, role });
                Ok(())
            }
            _ => Err(self.malformed("member without type or ref")),
        }
    }

    fn malformed(&self, what: &str) -> Error {
        match self.id {
            Some(id) => Error::MalformedElement(format!("{} {}: {}", self.element_type, id, what)),
            None => Error::MalformedElement(format!("{}: {}", self.element_type, what)),
        }
    }

    fn build(self) -> Result<Element> {
        let id = self.id.ok_or_else(|| self.malformed("missing id"))?;
        let version = self.version.ok_or_else(|| self.malformed("missing version"))?;
        Ok(match self.element_type {
            ElementType::Node => Element::node(id, version, self.tags),
            ElementType::Way => Element::way(id, version, self.tags, self.nd),
            ElementType::Relation => Element::relation(id, version, self.tags, self.members),
        })
    }
}

fn attribute_value(el: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attribute_res in el.attributes() {
        let attribute = attribute_res?;
        if attribute.key.as_ref() == name {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_changeset_header(el: &BytesStart) -> Result<ChangesetHeader> {
    let mut header = ChangesetHeader::default();
    let mut has_id = false;
    for attribute_res in el.attributes() {
        let attribute = attribute_res?;
        match attribute.key.as_ref() {
            b"id" => {
                header.id = attribute.unescape_value()?.parse()?;
                has_id = true;
            }
            b"user" => header.user = Some(attribute.unescape_value()?.into_owned()),
            b"uid" => header.uid = Some(attribute.unescape_value()?.parse()?),
            _ => (),
        }
    }
    if !has_id {
        return Err(Error::MalformedElement("changeset: missing id".to_string()));
    }
    Ok(header)
}

fn element_type_of(name: &[u8]) -> Option<ElementType> {
    match name {
        b"node" => Some(ElementType::Node),
        b"way" => Some(ElementType::Way),
        b"relation" => Some(ElementType::Relation),
        _ => None,
    }
}

fn change_kind_of(name: &[u8]) -> Option<ChangeKind> {
    match name {
        b"create" => Some(ChangeKind::Create),
        b"modify" => Some(ChangeKind::Modify),
        b"delete" => Some(ChangeKind::Delete),
        _ => None,
    }
}

#[derive(Default)]
struct DocumentParser {
    document: OsmDocument,
    current: Option<ElementBuilder>,
    in_block: bool,
}

impl DocumentParser {
    fn start(&mut self, el: &BytesStart, empty: bool) -> Result<()> {
        let name = el.name();
        if let Some(element_type) = element_type_of(name.as_ref()) {
            if self.current.is_some() {
                return Err(Error::MalformedElement(format!(
                    "{} nested in another element",
                    element_type
                )));
            }
            self.current = Some(ElementBuilder::from_start(element_type, el)?);
            if empty {
                self.finish_element()?;
            }
            return Ok(());
        }
        if let Some(kind) = change_kind_of(name.as_ref()) {
            self.document.blocks.push((kind, Vec::new()));
            self.in_block = !empty;
            return Ok(());
        }

        match (name.as_ref(), self.current.as_mut()) {
            (b"tag", Some(builder)) => builder.add_tag(el),
            (b"nd", Some(builder)) => builder.add_nd(el),
            (b"member", Some(builder)) => builder.add_member(el),
            (b"changeset", None) => {
                self.document.changeset = Some(parse_changeset_header(el)?);
                Ok(())
            }
            // Changeset tags, bounds, discussions, notes.
            _ => Ok(()),
        }
    }

    fn end(&mut self, name: &[u8]) -> Result<()> {
        if element_type_of(name).is_some() {
            return self.finish_element();
        }
        if change_kind_of(name).is_some() {
            self.in_block = false;
        }
        Ok(())
    }

    fn finish_element(&mut self) -> Result<()> {
        let Some(builder) = self.current.take() else {
            return Ok(());
        };
        let element = builder.build()?;
        match self.document.blocks.last_mut() {
            Some((_, elements)) if self.in_block => elements.push(element),
            _ => self.document.elements.push(element),
        }
        Ok(())
    }
}

/// Reads an OSM API XML document.
pub fn parse_document<R: BufRead>(input: R) -> Result<OsmDocument> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut parser = DocumentParser::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(e.into()),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => parser.start(&e, false)?,
            Ok(Event::Empty(e)) => parser.start(&e, true)?,
            Ok(Event::End(e)) => parser.end(e.name().as_ref())?,
            // Declarations, comments and changeset discussion text.
            Ok(_) => (),
        }
        buf.clear();
    }

    if parser.current.is_some() {
        return Err(Error::MalformedElement("document ended inside an element".to_string()));
    }
    Ok(parser.document)
}

pub fn parse_elements(xml: &[u8]) -> Result<Vec<Element>> {
    Ok(parse_document(xml)?.elements)
}

pub fn parse_change(xml: &[u8]) -> Result<Vec<(ChangeKind, Vec<Element>)>> {
    let document = parse_document(xml)?;
    if !document.elements.is_empty() {
        warn!(count = document.elements.len(); "Ignoring elements outside of change blocks");
    }
    Ok(document.blocks)
}

pub fn parse_changeset(xml: &[u8]) -> Result<ChangesetHeader> {
    parse_document(xml)?
        .changeset
        .ok_or_else(|| Error::MalformedElement("document has no changeset".to_string()))
}

pub fn read_document(path: &Path) -> Result<OsmDocument> {
    let file = fs::File::open(path)?;
    parse_document(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::osm::tags;

    const CHANGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osmChange version="0.6" generator="OpenStreetMap server">
  <create>
    <node id="101" version="1" changeset="9" lat="51.5" lon="-0.1">
      <tag k="amenity" v="bench"/>
    </node>
    <node id="102" version="1" changeset="9" lat="51.5" lon="-0.1"/>
  </create>
  <modify>
    <way id="200" version="3" changeset="9">
      <nd ref="102"/>
      <nd ref="103"/>
      <tag k="highway" v="footway"/>
      <tag k="name" v="Fish &amp; Chips Lane"/>
    </way>
    <relation id="300" version="2" changeset="9">
      <member type="way" ref="200" role="outer"/>
      <member type="node" ref="101" role=""/>
      <tag k="type" v="multipolygon"/>
    </relation>
  </modify>
</osmChange>"#;

    #[test]
    fn parses_change_blocks_in_order() {
        let blocks = parse_change(CHANGE.as_bytes()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, ChangeKind::Create);
        assert_eq!(blocks[0].1, vec![
            Element::node(101, 1, tags([("amenity", "bench")])),
            Element::node(102, 1, Tags::new()),
        ]);

        let (kind, modified) = &blocks[1];
        assert_eq!(*kind, ChangeKind::Modify);
        assert_eq!(
            modified[0],
            Element::way(
                200,
                3,
                tags([("highway", "footway"), ("name", "Fish & Chips Lane")]),
                vec![102, 103]
            )
        );
        match &modified[1].kind {
            crate::data::ElementKind::Relation { members } => {
                assert_eq!(members.len(), 2);
                assert_eq!(members[0].member_type, ElementType::Way);
                assert_eq!(members[0].role, "outer");
                assert_eq!(members[1].id, 101);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_changeset_header() {
        let xml = br#"<osm version="0.6">
  <changeset id="42" user="mapper" uid="77" open="false">
    <tag k="comment" v="Added benches"/>
  </changeset>
</osm>"#;
        let header = parse_changeset(xml).unwrap();
        assert_eq!(header, ChangesetHeader { id: 42, user: Some("mapper".into()), uid: Some(77) });
    }

    #[test]
    fn parses_lookup_results() {
        let xml = br#"<osm version="0.6">
  <way id="5" version="2"><nd ref="1"/><nd ref="2"/><tag k="highway" v="service"/></way>
  <way id="6" version="1"><nd ref="1"/></way>
</osm>"#;
        let ways = parse_elements(xml).unwrap();
        assert_eq!(ways.len(), 2);
        assert_eq!(ways[1], Element::way(6, 1, Tags::new(), vec![1]));
    }

    #[test]
    fn missing_version_is_malformed() {
        let err = parse_elements(br#"<osm><node id="1"/></osm>"#).unwrap_err();
        match err {
            Error::MalformedElement(message) => assert_eq!(message, "node 1: missing version"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bad_member_type_is_malformed() {
        let xml = br#"<osm><relation id="1" version="1"><member type="area" ref="2" role=""/></relation></osm>"#;
        assert!(matches!(parse_elements(xml), Err(Error::MalformedElement(_))));
    }

    #[test]
    fn empty_change_block_stays_empty() {
        let xml = br#"<osmChange><delete/><create><node id="1" version="1"/></create></osmChange>"#;
        let blocks = parse_change(xml).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].1.is_empty());
        assert_eq!(blocks[1].1.len(), 1);
    }
}
