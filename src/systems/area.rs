use serde::{Deserialize, Serialize};

use crate::{
    display_types::{DisplayMeta, DisplayType, RgbaLine, RgbaPolygon},
    error::{OdeError, Result},
    geometry_utils::{distance_to_segment, point_in_polygon, segments_intersect, side_of_line},
    tracking::BoundingBox,
    Point2D,
};

/// Which point of an object's bounding box is tested against an Area
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum BboxTestPoint {
    #[default]
    Center,
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    /// Any of the above points will do; trajectories use the center
    Any,
}

impl BboxTestPoint {
    const ALL: [BboxTestPoint; 9] = [
        BboxTestPoint::Center,
        BboxTestPoint::NorthWest,
        BboxTestPoint::North,
        BboxTestPoint::NorthEast,
        BboxTestPoint::East,
        BboxTestPoint::SouthEast,
        BboxTestPoint::South,
        BboxTestPoint::SouthWest,
        BboxTestPoint::West,
    ];

    pub fn point(&self, bbox: &BoundingBox) -> Point2D {
        let (cx, cy) = bbox.center();
        let (l, t, r, b) = (bbox.left, bbox.top, bbox.right(), bbox.bottom());
        match self {
            BboxTestPoint::Center | BboxTestPoint::Any => (cx, cy),
            BboxTestPoint::NorthWest => (l, t),
            BboxTestPoint::North => (cx, t),
            BboxTestPoint::NorthEast => (r, t),
            BboxTestPoint::East => (r, cy),
            BboxTestPoint::SouthEast => (r, b),
            BboxTestPoint::South => (cx, b),
            BboxTestPoint::SouthWest => (l, b),
            BboxTestPoint::West => (l, cy),
        }
    }

    fn candidates(&self, bbox: &BoundingBox) -> Vec<Point2D> {
        match self {
            BboxTestPoint::Any => Self::ALL.iter().map(|p| p.point(bbox)).collect(),
            p => vec![p.point(bbox)],
        }
    }
}

/// Direction of a crossing, relative to the Area's orientation
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CrossDirection {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AreaGeometry {
    /// A line segment with a stroke width. "In" is a move from the left-hand
    /// side of start->end to its right-hand side, as seen on screen (y down).
    Line {
        start: Point2D,
        end: Point2D,
        width: f32,
    },
    /// "In" is a move from outside to inside.
    Polygon { vertices: Vec<Point2D> },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AreaSpec {
    /// `line` names a Line display type
    Line {
        line: String,
        #[serde(default)]
        test_point: BboxTestPoint,
        #[serde(default)]
        show: bool,
    },
    /// Objects qualify when their test point is inside `polygon`
    Inclusion {
        polygon: String,
        #[serde(default)]
        test_point: BboxTestPoint,
        #[serde(default)]
        show: bool,
    },
    /// Objects qualify when their test point is outside `polygon`
    Exclusion {
        polygon: String,
        #[serde(default)]
        test_point: BboxTestPoint,
        #[serde(default)]
        show: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Area {
    id: String,
    geometry: AreaGeometry,
    exclusion: bool,
    test_point: BboxTestPoint,
    display: Option<DisplayMeta>,
}

impl Area {
    pub fn line(id: &str, start: Point2D, end: Point2D, width: f32, test_point: BboxTestPoint) -> Self {
        Area {
            id: String::from(id),
            geometry: AreaGeometry::Line { start, end, width },
            exclusion: false,
            test_point,
            display: None,
        }
    }

    pub fn polygon(id: &str, vertices: Vec<Point2D>, exclusion: bool, test_point: BboxTestPoint) -> Self {
        Area {
            id: String::from(id),
            geometry: AreaGeometry::Polygon { vertices },
            exclusion,
            test_point,
            display: None,
        }
    }

    pub fn from_spec<'a, F>(id: &str, spec: &AreaSpec, lookup: F) -> Result<Area>
    where
        F: Fn(&str) -> Option<&'a DisplayType>,
    {
        match spec {
            AreaSpec::Line {
                line,
                test_point,
                show,
            } => match lookup(line).and_then(|t| t.as_meta()) {
                Some(DisplayMeta::Line(l)) => {
                    let RgbaLine { start, end, width, .. } = l;
                    if start == end {
                        return Err(OdeError::invalid("line area", "line has zero length"));
                    }
                    let mut area = Area::line(id, *start, *end, *width as f32, *test_point);
                    if *show {
                        area.display = Some(DisplayMeta::Line(l.clone()));
                    }
                    Ok(area)
                }
                Some(_) => Err(OdeError::invalid(
                    "line area",
                    format!("\"{line}\" is not a line display type"),
                )),
                None => Err(OdeError::unknown("line", line)),
            },
            AreaSpec::Inclusion {
                polygon,
                test_point,
                show,
            }
            | AreaSpec::Exclusion {
                polygon,
                test_point,
                show,
            } => match lookup(polygon).and_then(|t| t.as_meta()) {
                Some(DisplayMeta::Polygon(p)) => {
                    let RgbaPolygon { coordinates, .. } = p;
                    let exclusion = matches!(spec, AreaSpec::Exclusion { .. });
                    let mut area = Area::polygon(id, coordinates.clone(), exclusion, *test_point);
                    if *show {
                        area.display = Some(DisplayMeta::Polygon(p.clone()));
                    }
                    Ok(area)
                }
                Some(_) => Err(OdeError::invalid(
                    "polygon area",
                    format!("\"{polygon}\" is not a polygon display type"),
                )),
                None => Err(OdeError::unknown("polygon", polygon)),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry(&self) -> &AreaGeometry {
        &self.geometry
    }

    pub fn display(&self) -> Option<&DisplayMeta> {
        self.display.as_ref()
    }

    /// The point of `bbox` recorded for trajectories
    pub fn test_point(&self, bbox: &BoundingBox) -> Point2D {
        self.test_point.point(bbox)
    }

    /// Area membership for criteria checks: inside an inclusion polygon,
    /// outside an exclusion polygon, or on (within half the stroke width of)
    /// a line.
    pub fn contains(&self, bbox: &BoundingBox) -> bool {
        let points = self.test_point.candidates(bbox);
        match &self.geometry {
            AreaGeometry::Line { start, end, width } => {
                let tolerance = (width / 2.).max(1.);
                points
                    .iter()
                    .any(|p| distance_to_segment(p, start, end) <= tolerance)
            }
            AreaGeometry::Polygon { vertices } => {
                let inside = points.iter().any(|p| point_in_polygon(p, vertices));
                inside != self.exclusion
            }
        }
    }

    /// If the step `from` -> `to` crosses this Area, which way it went
    /// True if `p` sits exactly on a line area. Such a sample belongs to
    /// neither side, so a crossing through it is decided by the samples
    /// around it.
    pub fn on_line(&self, p: &Point2D) -> bool {
        match &self.geometry {
            AreaGeometry::Line { start, end, .. } => side_of_line(start, end, p) == 0.,
            AreaGeometry::Polygon { .. } => false,
        }
    }

    pub fn crossing(&self, from: &Point2D, to: &Point2D) -> Option<CrossDirection> {
        match &self.geometry {
            AreaGeometry::Line { start, end, .. } => {
                if segments_intersect(from, to, start, end) {
                    if side_of_line(start, end, to) > 0. {
                        Some(CrossDirection::In)
                    } else {
                        Some(CrossDirection::Out)
                    }
                } else {
                    None
                }
            }
            AreaGeometry::Polygon { vertices } => {
                match (point_in_polygon(from, vertices), point_in_polygon(to, vertices)) {
                    (false, true) => Some(CrossDirection::In),
                    (true, false) => Some(CrossDirection::Out),
                    _ => None,
                }
            }
        }
    }
}
