use bytes::Bytes;
use ldap_ber::{tag, BerReader, BerWriter};

/// `controls [0]` of an LDAPMessage
pub(crate) const CONTROLS: u8 = tag::context_constructed(0);

/// Request or response control (RFC 4511 section 4.1.11)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: String,
    pub criticality: bool,
    pub value: Option<Bytes>,
}

impl Control {
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            criticality: false,
            value: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.criticality = true;
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub(crate) fn encode(&self, w: &mut BerWriter) {
        w.write_sequence(|w| {
            w.write_octet_string(tag::OCTET_STRING, self.oid.as_bytes());
            // DEFAULT FALSE
            if self.criticality {
                w.write_bool(tag::BOOLEAN, true);
            }
            if let Some(ref value) = self.value {
                w.write_octet_string(tag::OCTET_STRING, value);
            }
        });
    }

    pub(crate) fn decode(r: &mut BerReader<'_>) -> ldap_ber::Result<Self> {
        let mut seq = r.read_element(tag::SEQUENCE)?;
        let oid = seq.read_string(tag::OCTET_STRING)?;
        let criticality = match seq.peek_tag() {
            Some(tag::BOOLEAN) => seq.read_bool(tag::BOOLEAN)?,
            _ => false,
        };
        let value = seq
            .read_optional(tag::OCTET_STRING)?
            .map(|content| Bytes::copy_from_slice(content.rest()));
        seq.finish()?;
        Ok(Self {
            oid,
            criticality,
            value,
        })
    }
}

pub(crate) fn encode_controls(w: &mut BerWriter, controls: &[Control]) {
    if controls.is_empty() {
        return;
    }
    w.write_constructed(CONTROLS, |w| {
        for control in controls {
            control.encode(w);
        }
    });
}

pub(crate) fn decode_controls(r: &mut BerReader<'_>) -> ldap_ber::Result<Vec<Control>> {
    let mut controls = Vec::new();
    if let Some(mut content) = r.read_optional(CONTROLS)? {
        while !content.is_empty() {
            controls.push(Control::decode(&mut content)?);
        }
    }
    Ok(controls)
}
