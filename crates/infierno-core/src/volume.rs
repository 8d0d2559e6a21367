//! Volume adjustment.

use crate::error::Result;
use crate::module::{BoxedModule, Module};
use crate::sample::Sample;

/// Scales every sample from the source by a fixed level.
pub struct Volume<'a, S: Sample> {
    source: BoxedModule<'a, S>,
    level: f32,
}

impl<'a, S: Sample> Volume<'a, S> {
    /// Construct a volume adjuster with a linear level.
    pub fn new(source: BoxedModule<'a, S>, level: f32) -> Self {
        Self { source, level }
    }
}

impl<'a, S: Sample> Module<S> for Volume<'a, S> {
    fn next(&mut self, out: &mut S) -> Result<bool> {
        let live = self.source.next(out)?;
        *out *= self.level;
        Ok(live)
    }

    fn is_running(&mut self) -> bool {
        self.source.is_running()
    }
}
