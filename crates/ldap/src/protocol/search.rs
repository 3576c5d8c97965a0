//! Search operation (RFC 4511 section 4.5)
//!
//! Filters are built structurally; there is no parser for the RFC 4515
//! string representation.

use super::result::LdapResult;
use super::LdapOperation;
use bytes::Bytes;
use ldap_ber::{tag, BerError, BerReader, BerWriter};

const FILTER_AND: u8 = tag::context_constructed(0);
const FILTER_OR: u8 = tag::context_constructed(1);
const FILTER_NOT: u8 = tag::context_constructed(2);
const FILTER_EQUALITY: u8 = tag::context_constructed(3);
const FILTER_SUBSTRINGS: u8 = tag::context_constructed(4);
const FILTER_GREATER_OR_EQUAL: u8 = tag::context_constructed(5);
const FILTER_LESS_OR_EQUAL: u8 = tag::context_constructed(6);
const FILTER_PRESENT: u8 = tag::context(7);
const FILTER_APPROX: u8 = tag::context_constructed(8);
const FILTER_EXTENSIBLE: u8 = tag::context_constructed(9);

const SUBSTRING_INITIAL: u8 = tag::context(0);
const SUBSTRING_ANY: u8 = tag::context(1);
const SUBSTRING_FINAL: u8 = tag::context(2);

const MATCHING_RULE: u8 = tag::context(1);
const MATCHING_TYPE: u8 = tag::context(2);
const MATCH_VALUE: u8 = tag::context(3);
const DN_ATTRIBUTES: u8 = tag::context(4);

/// Deepest and/or/not nesting accepted from the wire
pub const MAX_FILTER_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    BaseObject = 0,
    SingleLevel = 1,
    WholeSubtree = 2,
}

impl SearchScope {
    fn from_i64(value: i64, offset: usize) -> ldap_ber::Result<Self> {
        match value {
            0 => Ok(Self::BaseObject),
            1 => Ok(Self::SingleLevel),
            2 => Ok(Self::WholeSubtree),
            other => Err(BerError::InvalidValue {
                offset,
                reason: format!("search scope {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefAliases {
    Never = 0,
    InSearching = 1,
    FindingBaseObject = 2,
    Always = 3,
}

impl DerefAliases {
    fn from_i64(value: i64, offset: usize) -> ldap_ber::Result<Self> {
        match value {
            0 => Ok(Self::Never),
            1 => Ok(Self::InSearching),
            2 => Ok(Self::FindingBaseObject),
            3 => Ok(Self::Always),
            other => Err(BerError::InvalidValue {
                offset,
                reason: format!("derefAliases {other}"),
            }),
        }
    }
}

/// One component of a substrings assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstringFilter {
    Initial(Bytes),
    Any(Bytes),
    Final(Bytes),
}

/// Search filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(String, Bytes),
    Substrings(String, Vec<SubstringFilter>),
    GreaterOrEqual(String, Bytes),
    LessOrEqual(String, Bytes),
    Present(String),
    Approx(String, Bytes),
    Extensible {
        matching_rule: Option<String>,
        attribute: Option<String>,
        value: Bytes,
        dn_attributes: bool,
    },
}

impl Filter {
    pub fn equality(attribute: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self::Equality(attribute.into(), value.into())
    }

    pub fn present(attribute: impl Into<String>) -> Self {
        Self::Present(attribute.into())
    }

    /// `(objectClass=*)`
    pub fn any_object() -> Self {
        Self::present("objectClass")
    }

    fn encode(&self, w: &mut BerWriter) {
        match self {
            Self::And(filters) => w.write_constructed(FILTER_AND, |w| {
                filters.iter().for_each(|f| f.encode(w))
            }),
            Self::Or(filters) => w.write_constructed(FILTER_OR, |w| {
                filters.iter().for_each(|f| f.encode(w))
            }),
            Self::Not(filter) => w.write_constructed(FILTER_NOT, |w| filter.encode(w)),
            Self::Equality(attr, value) => write_assertion(w, FILTER_EQUALITY, attr, value),
            Self::Substrings(attr, parts) => w.write_constructed(FILTER_SUBSTRINGS, |w| {
                w.write_octet_string(tag::OCTET_STRING, attr.as_bytes());
                w.write_sequence(|w| {
                    for part in parts {
                        match part {
                            SubstringFilter::Initial(v) => w.write_octet_string(SUBSTRING_INITIAL, v),
                            SubstringFilter::Any(v) => w.write_octet_string(SUBSTRING_ANY, v),
                            SubstringFilter::Final(v) => w.write_octet_string(SUBSTRING_FINAL, v),
                        }
                    }
                });
            }),
            Self::GreaterOrEqual(attr, value) => {
                write_assertion(w, FILTER_GREATER_OR_EQUAL, attr, value)
            }
            Self::LessOrEqual(attr, value) => write_assertion(w, FILTER_LESS_OR_EQUAL, attr, value),
            Self::Present(attr) => w.write_octet_string(FILTER_PRESENT, attr.as_bytes()),
            Self::Approx(attr, value) => write_assertion(w, FILTER_APPROX, attr, value),
            Self::Extensible {
                matching_rule,
                attribute,
                value,
                dn_attributes,
            } => w.write_constructed(FILTER_EXTENSIBLE, |w| {
                if let Some(rule) = matching_rule {
                    w.write_octet_string(MATCHING_RULE, rule.as_bytes());
                }
                if let Some(attr) = attribute {
                    w.write_octet_string(MATCHING_TYPE, attr.as_bytes());
                }
                w.write_octet_string(MATCH_VALUE, value);
                if *dn_attributes {
                    w.write_bool(DN_ATTRIBUTES, true);
                }
            }),
        }
    }

    fn decode(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        Self::decode_nested(r, 0)
    }

    fn decode_nested(r: &mut BerReader<'_>, depth: usize) -> ldap_ber::Result<Self> {
        let (found, offset, mut content) = r.read_any()?;
        let nested = matches!(found, FILTER_AND | FILTER_OR | FILTER_NOT);
        if nested && depth >= MAX_FILTER_DEPTH {
            return Err(BerError::InvalidValue {
                offset,
                reason: format!("filter nested deeper than {MAX_FILTER_DEPTH}"),
            });
        }
        let filter = match found {
            FILTER_AND => Self::And(decode_filter_set(&mut content, depth + 1)?),
            FILTER_OR => Self::Or(decode_filter_set(&mut content, depth + 1)?),
            FILTER_NOT => Self::Not(Box::new(Self::decode_nested(&mut content, depth + 1)?)),
            FILTER_EQUALITY => {
                let (attr, value) = read_assertion(&mut content)?;
                Self::Equality(attr, value)
            }
            FILTER_SUBSTRINGS => {
                let attr = content.read_string(tag::OCTET_STRING)?;
                let mut seq = content.read_element(tag::SEQUENCE)?;
                let mut parts = Vec::new();
                while !seq.is_empty() {
                    let (part_tag, part_offset, part) = seq.read_any()?;
                    let value = Bytes::copy_from_slice(part.rest());
                    parts.push(match part_tag {
                        SUBSTRING_INITIAL => SubstringFilter::Initial(value),
                        SUBSTRING_ANY => SubstringFilter::Any(value),
                        SUBSTRING_FINAL => SubstringFilter::Final(value),
                        other => {
                            return Err(BerError::UnexpectedTag {
                                offset: part_offset,
                                expected: SUBSTRING_ANY,
                                found: other,
                            })
                        }
                    });
                }
                Self::Substrings(attr, parts)
            }
            FILTER_GREATER_OR_EQUAL => {
                let (attr, value) = read_assertion(&mut content)?;
                Self::GreaterOrEqual(attr, value)
            }
            FILTER_LESS_OR_EQUAL => {
                let (attr, value) = read_assertion(&mut content)?;
                Self::LessOrEqual(attr, value)
            }
            FILTER_PRESENT => {
                let attr = std::str::from_utf8(content.rest())
                    .map_err(|e| BerError::InvalidUtf8 {
                        offset: content.offset() + e.valid_up_to(),
                    })?
                    .to_owned();
                return Ok(Self::Present(attr));
            }
            FILTER_APPROX => {
                let (attr, value) = read_assertion(&mut content)?;
                Self::Approx(attr, value)
            }
            FILTER_EXTENSIBLE => {
                let matching_rule = match content.peek_tag() {
                    Some(MATCHING_RULE) => Some(content.read_string(MATCHING_RULE)?),
                    _ => None,
                };
                let attribute = match content.peek_tag() {
                    Some(MATCHING_TYPE) => Some(content.read_string(MATCHING_TYPE)?),
                    _ => None,
                };
                let value = content.read_bytes(MATCH_VALUE)?;
                let dn_attributes = match content.peek_tag() {
                    Some(DN_ATTRIBUTES) => content.read_bool(DN_ATTRIBUTES)?,
                    _ => false,
                };
                Self::Extensible {
                    matching_rule,
                    attribute,
                    value,
                    dn_attributes,
                }
            }
            other => {
                return Err(BerError::InvalidValue {
                    offset,
                    reason: format!("unknown filter choice 0x{other:02x}"),
                })
            }
        };
        content.finish()?;
        Ok(filter)
    }
}

fn write_assertion(w: &mut BerWriter, choice: u8, attribute: &str, value: &[u8]) {
    w.write_constructed(choice, |w| {
        w.write_octet_string(tag::OCTET_STRING, attribute.as_bytes());
        w.write_octet_string(tag::OCTET_STRING, value);
    });
}

fn read_assertion(r: &mut BerReader<'_>) -> ldap_ber::Result<(String, Bytes)> {
    let attribute = r.read_string(tag::OCTET_STRING)?;
    let value = r.read_bytes(tag::OCTET_STRING)?;
    Ok((attribute, value))
}

fn decode_filter_set(r: &mut BerReader<'_>, depth: usize) -> ldap_ber::Result<Vec<Filter>> {
    let mut filters = Vec::new();
    while !r.is_empty() {
        filters.push(Filter::decode_nested(r, depth)?);
    }
    Ok(filters)
}

/// ```text
/// SearchRequest ::= [APPLICATION 3] SEQUENCE {
///      baseObject      LDAPDN,
///      scope           ENUMERATED,
///      derefAliases    ENUMERATED,
///      sizeLimit       INTEGER (0 ..  maxInt),
///      timeLimit       INTEGER (0 ..  maxInt),
///      typesOnly       BOOLEAN,
///      filter          Filter,
///      attributes      AttributeSelection }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_object: String,
    pub scope: SearchScope,
    pub deref_aliases: DerefAliases,
    pub size_limit: i32,
    pub time_limit: i32,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn new(base_object: impl Into<String>, scope: SearchScope, filter: Filter) -> Self {
        Self {
            base_object: base_object.into(),
            scope,
            deref_aliases: DerefAliases::Never,
            size_limit: 0,
            time_limit: 0,
            types_only: false,
            filter,
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_size_limit(mut self, size_limit: i32) -> Self {
        self.size_limit = size_limit;
        self
    }
}

impl LdapOperation for SearchRequest {
    const TAG: u8 = tag::application_constructed(3);

    fn encode_content(&self, w: &mut BerWriter) {
        w.write_octet_string(tag::OCTET_STRING, self.base_object.as_bytes());
        w.write_enumerated(self.scope as i64);
        w.write_enumerated(self.deref_aliases as i64);
        w.write_integer(tag::INTEGER, self.size_limit as i64);
        w.write_integer(tag::INTEGER, self.time_limit as i64);
        w.write_bool(tag::BOOLEAN, self.types_only);
        self.filter.encode(w);
        w.write_sequence(|w| {
            for attr in &self.attributes {
                w.write_octet_string(tag::OCTET_STRING, attr.as_bytes());
            }
        });
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let base_object = r.read_string(tag::OCTET_STRING)?;
        let offset = r.offset();
        let scope = SearchScope::from_i64(r.read_integer(tag::ENUMERATED)?, offset)?;
        let offset = r.offset();
        let deref_aliases = DerefAliases::from_i64(r.read_integer(tag::ENUMERATED)?, offset)?;
        let size_limit = r.read_i32(tag::INTEGER)?;
        let time_limit = r.read_i32(tag::INTEGER)?;
        let types_only = r.read_bool(tag::BOOLEAN)?;
        let filter = Filter::decode(r)?;
        let mut attrs = r.read_element(tag::SEQUENCE)?;
        let mut attributes = Vec::new();
        while !attrs.is_empty() {
            attributes.push(attrs.read_string(tag::OCTET_STRING)?);
        }
        Ok(Self {
            base_object,
            scope,
            deref_aliases,
            size_limit,
            time_limit,
            types_only,
            filter,
            attributes,
        })
    }
}

/// Attribute type with its values, as returned in search entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialAttribute {
    pub name: String,
    pub values: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultEntry {
    pub object_name: String,
    pub attributes: Vec<PartialAttribute>,
}

impl SearchResultEntry {
    /// Values of the first attribute matching `name` (case-insensitive)
    pub fn values(&self, name: &str) -> Option<&[Bytes]> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.values.as_slice())
    }
}

impl LdapOperation for SearchResultEntry {
    const TAG: u8 = tag::application_constructed(4);

    fn encode_content(&self, w: &mut BerWriter) {
        w.write_octet_string(tag::OCTET_STRING, self.object_name.as_bytes());
        w.write_sequence(|w| {
            for attr in &self.attributes {
                w.write_sequence(|w| {
                    w.write_octet_string(tag::OCTET_STRING, attr.name.as_bytes());
                    w.write_constructed(tag::SET, |w| {
                        for value in &attr.values {
                            w.write_octet_string(tag::OCTET_STRING, value);
                        }
                    });
                });
            }
        });
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let object_name = r.read_string(tag::OCTET_STRING)?;
        let mut list = r.read_element(tag::SEQUENCE)?;
        let mut attributes = Vec::new();
        while !list.is_empty() {
            let mut attr = list.read_element(tag::SEQUENCE)?;
            let name = attr.read_string(tag::OCTET_STRING)?;
            let mut set = attr.read_element(tag::SET)?;
            let mut values = Vec::new();
            while !set.is_empty() {
                values.push(set.read_bytes(tag::OCTET_STRING)?);
            }
            attr.finish()?;
            attributes.push(PartialAttribute { name, values });
        }
        Ok(Self {
            object_name,
            attributes,
        })
    }
}

/// Continuation references returned instead of entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultReference {
    pub uris: Vec<String>,
}

impl LdapOperation for SearchResultReference {
    const TAG: u8 = tag::application_constructed(19);

    fn encode_content(&self, w: &mut BerWriter) {
        for uri in &self.uris {
            w.write_octet_string(tag::OCTET_STRING, uri.as_bytes());
        }
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let mut uris = Vec::new();
        while !r.is_empty() {
            uris.push(r.read_string(tag::OCTET_STRING)?);
        }
        Ok(Self { uris })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultDone {
    pub result: LdapResult,
}

impl LdapOperation for SearchResultDone {
    const TAG: u8 = tag::application_constructed(5);

    fn encode_content(&self, w: &mut BerWriter) {
        self.result.encode_fields(w);
    }

    fn decode_content(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        Ok(Self {
            result: LdapResult::decode_fields(r)?,
        })
    }
}
