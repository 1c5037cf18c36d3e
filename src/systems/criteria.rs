use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    error::{OdeError, Result},
    tracking::DetectedObject,
};

use super::area::Area;

/// Per-trigger object filter. `None` and `0.` are the "any"/"unbounded" sentinels.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Criteria {
    #[serde(default)]
    pub source_id: Option<u32>,
    #[serde(default)]
    pub class_id: Option<u32>,
    #[serde(default)]
    pub min_confidence: Option<f32>,
    #[serde(default)]
    pub min_width: f32,
    #[serde(default)]
    pub min_height: f32,
    #[serde(default)]
    pub max_width: f32,
    #[serde(default)]
    pub max_height: f32,
}

fn bounds_ok(min: f32, max: f32) -> bool {
    min.is_finite() && max.is_finite() && min >= 0. && max >= 0. && (max == 0. || max >= min)
}

impl Criteria {
    pub fn new(source_id: Option<u32>, class_id: Option<u32>) -> Self {
        Criteria {
            source_id,
            class_id,
            ..Default::default()
        }
    }

    /// Checks every bound together, so a loaded or edited Criteria is
    /// either wholly valid or rejected.
    pub fn validate(&self) -> Result<()> {
        if let Some(c) = self.min_confidence {
            if !(0. ..=1.).contains(&c) {
                return Err(OdeError::invalid(
                    "confidence",
                    format!("minimum {c} is outside [0,1]"),
                ));
            }
        }
        if !bounds_ok(self.min_width, self.max_width) {
            return Err(OdeError::invalid(
                "dimensions",
                format!("width bounds [{}, {}]", self.min_width, self.max_width),
            ));
        }
        if !bounds_ok(self.min_height, self.max_height) {
            return Err(OdeError::invalid(
                "dimensions",
                format!("height bounds [{}, {}]", self.min_height, self.max_height),
            ));
        }
        Ok(())
    }

    pub fn set_confidence_min(&mut self, min_confidence: Option<f32>) -> Result<()> {
        let candidate = Criteria {
            min_confidence,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn set_dimensions_min(&mut self, min_width: f32, min_height: f32) -> Result<()> {
        let candidate = Criteria {
            min_width,
            min_height,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn set_dimensions_max(&mut self, max_width: f32, max_height: f32) -> Result<()> {
        let candidate = Criteria {
            max_width,
            max_height,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    pub fn source_matches(&self, source_id: u32) -> bool {
        self.source_id.map_or(true, |s| s == source_id)
    }

    /// Source, class, confidence and dimension checks, in that order
    pub fn matches_object(&self, source_id: u32, object: &DetectedObject) -> bool {
        if !self.source_matches(source_id) {
            return false;
        }
        if let Some(class_id) = self.class_id {
            if object.class_id != class_id {
                return false;
            }
        }
        if let Some(min_confidence) = self.min_confidence {
            if object.confidence < min_confidence {
                return false;
            }
        }
        let bbox = &object.bounding_box;
        if (self.min_width > 0. && bbox.width < self.min_width)
            || (self.min_height > 0. && bbox.height < self.min_height)
            || (self.max_width > 0. && bbox.width > self.max_width)
            || (self.max_height > 0. && bbox.height > self.max_height)
        {
            return false;
        }
        true
    }

    /// Full check, with area membership last. With several areas, any one will do.
    pub fn matches(&self, source_id: u32, object: &DetectedObject, areas: &[Arc<Area>]) -> bool {
        self.matches_object(source_id, object)
            && (areas.is_empty() || areas.iter().any(|a| a.contains(&object.bounding_box)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{systems::area::BboxTestPoint, tracking::BoundingBox};

    fn person(confidence: f32) -> DetectedObject {
        DetectedObject::new(2, confidence, BoundingBox::new(100., 100., 40., 120.))
    }

    #[test]
    fn test_confidence_floor() {
        let mut criteria = Criteria::new(None, Some(2));
        criteria.set_confidence_min(Some(0.4)).unwrap();
        assert!(!criteria.matches(0, &person(0.3), &[]));
        assert!(criteria.matches(0, &person(0.8), &[]));
        // Exactly on the floor counts
        assert!(criteria.matches(0, &person(0.4), &[]));
    }

    #[test]
    fn test_source_and_class_filters() {
        let criteria = Criteria::new(Some(1), Some(0));
        let mut car = person(0.9);
        car.class_id = 0;
        assert!(criteria.matches(1, &car, &[]));
        assert!(!criteria.matches(0, &car, &[]));
        assert!(!criteria.matches(1, &person(0.9), &[]));
    }

    #[test]
    fn test_zero_dimension_bounds_are_unbounded() {
        let mut criteria = Criteria::default();
        criteria.set_dimensions_min(0., 100.).unwrap();
        assert!(criteria.matches(0, &person(0.5), &[]));
        criteria.set_dimensions_max(30., 0.).unwrap();
        assert!(!criteria.matches(0, &person(0.5), &[]));
    }

    #[test]
    fn test_invalid_bounds_leave_criteria_untouched() {
        let mut criteria = Criteria::default();
        criteria.set_dimensions_min(50., 50.).unwrap();
        let before = criteria.clone();
        assert!(criteria.set_dimensions_max(10., 10.).unwrap_err().is_configuration());
        assert!(criteria.set_confidence_min(Some(1.5)).is_err());
        assert_eq!(criteria, before);
    }

    #[test]
    fn test_area_membership_is_checked_last() {
        let area = Arc::new(Area::polygon(
            "left-half",
            vec![(0., 0.), (320., 0.), (320., 480.), (0., 480.)],
            false,
            BboxTestPoint::Center,
        ));
        let criteria = Criteria::default();
        assert!(criteria.matches(0, &person(0.5), &[area.clone()]));

        let mut far = person(0.5);
        far.bounding_box.left = 500.;
        assert!(!criteria.matches(0, &far, &[area]));
        assert!(criteria.matches_object(0, &far));
    }
}
