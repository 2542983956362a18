use std::collections::BTreeSet;

use regex::Regex;

use crate::{
    errors::LifecycleError,
    point::{InjectionPoint, Scope},
};

/// Predicate over injection points
pub trait PointFilter: Send + Sync {
    fn accepts(&self, point: &InjectionPoint) -> bool;
}
impl<F> PointFilter for F
where
    F: Fn(&InjectionPoint) -> bool + Send + Sync,
{
    fn accepts(&self, point: &InjectionPoint) -> bool {
        self(point)
    }
}

/// Accepts points carrying every one of the tags
#[derive(Debug, Clone)]
pub struct AnnotationFilter {
    tags: BTreeSet<&'static str>,
}
impl PointFilter for AnnotationFilter {
    fn accepts(&self, point: &InjectionPoint) -> bool {
        self.tags.iter().all(|tag| point.has_tag(tag))
    }
}

/// Accepts points whose deployment name fully matches the pattern
#[derive(Debug, Clone)]
pub struct DeploymentFilter {
    pattern: Regex,
}
impl PointFilter for DeploymentFilter {
    fn accepts(&self, point: &InjectionPoint) -> bool {
        point
            .deployment_name()
            .is_some_and(|name| self.pattern.is_match(name))
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleFilter {
    scopes: BTreeSet<Scope>,
}
impl PointFilter for LifecycleFilter {
    fn accepts(&self, point: &InjectionPoint) -> bool {
        self.scopes.contains(&point.scope())
    }
}

#[derive(Debug, Clone)]
pub struct Inverse<F>(F);
impl<F: PointFilter> PointFilter for Inverse<F> {
    fn accepts(&self, point: &InjectionPoint) -> bool {
        !self.0.accepts(point)
    }
}

#[derive(Debug, Clone)]
pub struct Both<A, B>(A, B);
impl<A: PointFilter, B: PointFilter> PointFilter for Both<A, B> {
    fn accepts(&self, point: &InjectionPoint) -> bool {
        self.0.accepts(point) && self.1.accepts(point)
    }
}

/// An empty tag list accepts every point
pub fn by_annotation_presence(tags: impl IntoIterator<Item = &'static str>) -> AnnotationFilter {
    AnnotationFilter {
        tags: tags.into_iter().collect(),
    }
}

/// The pattern has to match the whole deployment name. Points without one never match.
pub fn by_deployment_name_pattern(pattern: &str) -> Result<DeploymentFilter, regex::Error> {
    Ok(DeploymentFilter {
        pattern: Regex::new(&format!("^(?:{pattern})$"))?,
    })
}

pub fn by_lifecycle(scopes: impl IntoIterator<Item = Scope>) -> LifecycleFilter {
    LifecycleFilter {
        scopes: scopes.into_iter().collect(),
    }
}

pub fn negate<F: PointFilter>(filter: F) -> Inverse<F> {
    Inverse(filter)
}

pub trait PointFilterExt: PointFilter + Sized {
    fn and<B: PointFilter>(self, other: B) -> Both<Self, B> {
        Both(self, other)
    }

    fn negate(self) -> Inverse<Self> {
        Inverse(self)
    }
}
impl<F: PointFilter> PointFilterExt for F {}

/// Points narrowed down by filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointSet {
    points: Vec<InjectionPoint>,
}
impl PointSet {
    pub fn new(points: Vec<InjectionPoint>) -> Self {
        Self { points }
    }

    pub fn filter(self, filter: &dyn PointFilter) -> Self {
        Self {
            points: self
                .points
                .into_iter()
                .filter(|point| filter.accepts(point))
                .collect(),
        }
    }

    /// The only point of the set
    pub fn single(self) -> Result<InjectionPoint, LifecycleError> {
        if self.points.len() != 1 {
            return Err(LifecycleError::NotSingle {
                points: self.points,
            });
        }
        let mut points = self.points;
        points.pop().ok_or(LifecycleError::NotSingle { points: Vec::new() })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InjectionPoint> {
        self.points.iter()
    }

    pub fn into_vec(self) -> Vec<InjectionPoint> {
        self.points
    }
}
impl IntoIterator for PointSet {
    type Item = InjectionPoint;
    type IntoIter = std::vec::IntoIter<InjectionPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}
impl<'a> IntoIterator for &'a PointSet {
    type Item = &'a InjectionPoint;
    type IntoIter = std::slice::Iter<'a, InjectionPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
impl FromIterator<InjectionPoint> for PointSet {
    fn from_iter<I: IntoIterator<Item = InjectionPoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
