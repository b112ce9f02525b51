//! Sensor areas tracking which bodies currently overlap them.

use parking_lot::Mutex;
use std::{
    cmp::Ordering,
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    collision::shapes::Shape,
    core::body::{Body, BodyInner, BodyKey},
};

/// One fixture of another body: the body and the index of the shape in its list.
#[derive(Debug, Clone)]
pub struct FixtureRef {
    pub body: Body,
    pub index: usize,
}

impl FixtureRef {
    pub fn new(body: Body, index: usize) -> Self {
        Self { body, index }
    }

    fn sort_key(&self) -> (BodyKey, usize) {
        (self.body.key(), self.index)
    }
}

impl PartialEq for FixtureRef {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for FixtureRef {}

impl PartialOrd for FixtureRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FixtureRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

struct SensorInner {
    body: Weak<Mutex<BodyInner>>,
    shape: Shape,
    name_filter: Option<String>,
    fixtures: Vec<FixtureRef>,
    contacts: Vec<Body>,
    rebuilds: u64,
}

impl SensorInner {
    fn rebuild_contacts(&mut self) {
        let mut contacts: Vec<Body> = Vec::with_capacity(self.fixtures.len());
        for fixture in &self.fixtures {
            if !contacts.contains(&fixture.body) {
                contacts.push(fixture.body.clone());
            }
        }
        self.contacts = contacts;
        self.rebuilds += 1;
    }
}

/// Shape attached to a body that reports overlapping bodies instead of colliding.
///
/// Fixture-level contacts are deduplicated per body: two fixtures of the same body
/// overlapping the sensor yield a single entry in [`Sensor::contacts`].
#[derive(Clone)]
pub struct Sensor {
    inner: Arc<Mutex<SensorInner>>,
}

impl PartialEq for Sensor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Sensor {}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Sensor")
            .field("shape", &inner.shape.kind())
            .field("name_filter", &inner.name_filter)
            .field("fixtures", &inner.fixtures.len())
            .field("contacts", &inner.contacts.len())
            .finish()
    }
}

impl Sensor {
    /// Creates a sensor on `body`. An attached body is re-homed so the sensor joins the
    /// simulation immediately.
    pub fn new(body: &Body, shape: Shape) -> Self {
        let sensor = Self {
            inner: Arc::new(Mutex::new(SensorInner {
                body: body.downgrade(),
                shape,
                name_filter: None,
                fixtures: Vec::new(),
                contacts: Vec::new(),
                rebuilds: 0,
            })),
        };
        body.push_sensor(sensor.clone());
        sensor
    }

    /// Only track fixtures of bodies named `filter`.
    pub fn with_name_filter(self, filter: impl Into<String>) -> Self {
        self.set_name_filter(Some(filter.into()));
        self
    }

    pub fn set_name_filter(&self, filter: Option<String>) {
        self.inner.lock().name_filter = filter;
    }

    pub fn name_filter(&self) -> Option<String> {
        self.inner.lock().name_filter.clone()
    }

    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn shape(&self) -> Shape {
        self.inner.lock().shape.clone()
    }

    /// Host body, if it still exists.
    pub fn body(&self) -> Option<Body> {
        self.inner.lock().body.upgrade().map(Body::from_inner)
    }

    /// Starts tracking a fixture. Returns `true` when the fixture set changed.
    pub fn begin_contact(&self, fixture: FixtureRef) -> bool {
        // Read the name before taking the sensor lock.
        let name = fixture.body.name();
        let mut inner = self.inner.lock();
        if let Some(filter) = &inner.name_filter {
            if name.as_deref() != Some(filter.as_str()) {
                return false;
            }
        }
        if inner.fixtures.contains(&fixture) {
            return false;
        }
        inner.fixtures.push(fixture);
        inner.rebuild_contacts();
        true
    }

    /// Stops tracking a fixture. Returns `true` when the fixture set changed.
    pub fn end_contact(&self, fixture: &FixtureRef) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.fixtures.len();
        inner.fixtures.retain(|f| f != fixture);
        if inner.fixtures.len() == before {
            return false;
        }
        inner.rebuild_contacts();
        true
    }

    /// Distinct bodies currently overlapping the sensor, in first-contact order.
    pub fn contacts(&self) -> Vec<Body> {
        self.inner.lock().contacts.clone()
    }

    pub fn is_touching(&self, body: &Body) -> bool {
        self.inner.lock().contacts.contains(body)
    }

    pub fn fixture_count(&self) -> usize {
        self.inner.lock().fixtures.len()
    }

    /// How many times the body list has been recomputed.
    pub fn rebuild_count(&self) -> u64 {
        self.inner.lock().rebuilds
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if !inner.fixtures.is_empty() {
            inner.fixtures.clear();
            inner.rebuild_contacts();
        }
    }
}
