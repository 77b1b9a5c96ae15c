use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::bbox::{BBox, Ltrb, Ltwh};
use crate::error::Error;
use crate::vehicle::VehicleClass;

pub type TrackId = i64;

/// One tracked object in one frame, as emitted by the external tracker.
///
/// `bbox` is `[x, y, width, height]` with `(x, y)` the top-left corner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackedDetection {
    #[serde(default)]
    pub id: Option<TrackId>,
    #[serde(alias = "class")]
    pub label: String,
    #[serde(default)]
    pub bbox: Option<Vec<f32>>,
    /// Set when the record could not be decoded.
    #[serde(skip)]
    defect: Option<&'static str>,
}

impl TrackedDetection {
    pub fn new(id: Option<TrackId>, label: impl Into<String>, bbox: BBox<Ltwh>) -> Self {
        Self {
            id,
            label: label.into(),
            bbox: Some(bbox.as_slice().to_vec()),
            defect: None,
        }
    }

    /// Decodes one tracker record. A record that does not decode is kept,
    /// with whatever id and label can be salvaged, and is rejected when
    /// observed, so it never takes the rest of its frame down.
    pub fn from_value(value: Value) -> Self {
        let id = value.get("id").and_then(Value::as_i64);
        let label = value
            .get("label")
            .or_else(|| value.get("class"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match serde_json::from_value(value) {
            Ok(det) => det,
            Err(_) => Self {
                id,
                label,
                bbox: None,
                defect: Some("undecodable tracker record"),
            },
        }
    }

    #[inline]
    pub fn class(&self) -> Option<VehicleClass> {
        VehicleClass::from_label(&self.label)
    }

    /// Fails for records that did not decode.
    #[inline]
    pub fn check(&self) -> Result<(), Error> {
        match self.defect {
            Some(reason) => Err(Error::MalformedDetection {
                track_id: self.id,
                reason,
            }),
            None => Ok(()),
        }
    }

    pub fn ltrb(&self) -> Result<BBox<Ltrb>, Error> {
        self.check()?;

        let malformed = |reason| Error::MalformedDetection {
            track_id: self.id,
            reason,
        };

        let coords = self.bbox.as_deref().ok_or_else(|| malformed("missing bbox"))?;
        let bbox = BBox::from_coords(coords).ok_or_else(|| malformed("bbox must have 4 coordinates"))?;

        if !bbox.is_finite() {
            return Err(malformed("non-finite bbox coordinate"));
        }

        Ok(bbox.as_ltrb())
    }
}
