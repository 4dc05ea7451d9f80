//! Per-interval counter storage shared by every collector.
//!
//! A `Stats` value is the opaque accumulator a watch or aggregator owns. Its
//! field list is also the chart schema: dimensions in the header and `SET`
//! lines in each snapshot are derived from it, so the two cannot drift apart.

/// Whether a field survives `Stats::reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Counted within one interval and zeroed after emission.
    Interval,
    /// Last known value, kept until the source reports a new one.
    Persistent,
}

/// One named counter or gauge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub value: i64,
    pub scope: Scope,
}

/// Ordered set of named integer fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    fields: Vec<Field>,
}

impl Stats {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interval-scoped field, starting at zero.
    pub fn counter(mut self, name: &'static str) -> Self {
        self.push(name, Scope::Interval);
        self
    }

    /// Adds a persistent field, starting at zero.
    pub fn gauge(mut self, name: &'static str) -> Self {
        self.push(name, Scope::Persistent);
        self
    }

    fn push(&mut self, name: &'static str, scope: Scope) {
        debug_assert!(self.get(name).is_none(), "duplicate field {name}");
        self.fields.push(Field {
            name,
            value: 0,
            scope,
        });
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.field(name).map(|f| f.value)
    }

    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Adds `delta` to a field. Unknown names are ignored.
    pub fn add(&mut self, name: &str, delta: i64) {
        if let Some(field) = self.field_mut(name) {
            field.value = field.value.saturating_add(delta);
        }
    }

    pub fn incr(&mut self, name: &str) {
        self.add(name, 1);
    }

    /// Overwrites a field. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: i64) {
        if let Some(field) = self.field_mut(name) {
            field.value = value;
        }
    }

    /// Adds every field of `other` whose name also exists here.
    pub fn merge(&mut self, other: &Stats) {
        for field in &other.fields {
            self.add(field.name, field.value);
        }
    }

    /// Zeroes interval fields; persistent fields keep their value.
    pub fn reset(&mut self) {
        for field in &mut self.fields {
            if field.scope == Scope::Interval {
                field.value = 0;
            }
        }
    }
}
