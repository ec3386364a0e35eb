//! Tub Writer
//!
//! Vehicle part that records one positional sample per loop iteration.

use crate::config::TubConfig;
use crate::error::{Result, TubError};

use super::store::{Tub, TubIterator, Values};
use super::value::Value;

/// Positional writer over a `Tub`
///
/// The vehicle loop calls `run` with one value per declared input, in
/// declaration order.
pub struct TubWriter {
    tub: Tub,
}

impl TubWriter {
    pub fn open(config: TubConfig) -> Result<Self> {
        Ok(Self {
            tub: Tub::open(config)?,
        })
    }

    /// Record one sample and return the number of records written so far
    ///
    /// Fails without writing if `args` does not have one value per input.
    pub fn run<I>(&mut self, args: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        let expected = self.tub.inputs().len();
        if args.len() != expected {
            return Err(TubError::ArityMismatch {
                expected,
                found: args.len(),
            });
        }

        let record: Values = self.tub.inputs().iter().cloned().zip(args).collect();
        self.tub.write_record(&record)?;
        Ok(self.tub.current_index())
    }

    pub fn iter(&self) -> TubIterator<'_> {
        self.tub.iter()
    }

    pub fn tub(&self) -> &Tub {
        &self.tub
    }

    pub fn tub_mut(&mut self) -> &mut Tub {
        &mut self.tub
    }

    pub fn close(self) -> Result<()> {
        self.tub.close()
    }

    /// Part shutdown hook; same as `close`
    pub fn shutdown(self) -> Result<()> {
        self.close()
    }
}
