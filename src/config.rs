use core::mem;

use thiserror::Error;

use crate::{align::DEFAULT_ALIGN, block::Block};

/// Which mutating operations trigger an eager walk of the whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Verify(u8);

impl Verify {
  pub const NONE: Verify = Verify(0);
  pub const ALLOC: Verify = Verify(1);
  pub const RELEASE: Verify = Verify(2);
  pub const ALWAYS: Verify = Verify(3);

  pub fn after_alloc(self) -> bool {
    self.0 & Self::ALLOC.0 != 0
  }

  pub fn after_release(self) -> bool {
    self.0 & Self::RELEASE.0 != 0
  }
}

impl core::ops::BitOr for Verify {
  type Output = Verify;

  fn bitor(
    self,
    rhs: Verify,
  ) -> Verify {
    Verify(self.0 | rhs.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("alignment unit {align} must be a power of two of at least {min}")]
  InvalidAlign { align: usize, min: usize },

  #[error("invalid value {value:?} for {key}")]
  InvalidValue { key: &'static str, value: String },
}

/// Tunables fixed when an arena is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  align: usize,
  verify: Verify,
  capture: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      align: DEFAULT_ALIGN,
      verify: Verify::NONE,
      capture: false,
    }
  }
}

impl Config {
  /// Sets the unit every request is rounded up to. Headers are read in
  /// place, so the unit can't be smaller than their natural alignment.
  pub fn with_align(
    mut self,
    align: usize,
  ) -> Result<Self, ConfigError> {
    let min = mem::align_of::<Block>();

    if !align.is_power_of_two() || align < min {
      return Err(ConfigError::InvalidAlign { align, min });
    }

    self.align = align;
    Ok(self)
  }

  pub fn with_verify(
    mut self,
    verify: Verify,
  ) -> Self {
    self.verify = verify;
    self
  }

  pub fn with_capture(
    mut self,
    capture: bool,
  ) -> Self {
    self.capture = capture;
    self
  }

  pub fn align(&self) -> usize {
    self.align
  }

  pub fn verify(&self) -> Verify {
    self.verify
  }

  pub fn capture(&self) -> bool {
    self.capture
  }

  /// Reads `BUFALLOC_ALIGN`, `BUFALLOC_VERIFY` and `BUFALLOC_CAPTURE` from
  /// the process environment. Unset variables keep their defaults.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Same as [`Config::from_env`], with variables resolved through `lookup`.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Config::default();

    if let Some(value) = lookup("BUFALLOC_ALIGN") {
      let align = value
        .trim()
        .parse::<usize>()
        .map_err(|_| invalid("BUFALLOC_ALIGN", &value))?;
      config = config.with_align(align)?;
    }

    if let Some(value) = lookup("BUFALLOC_VERIFY") {
      let verify = match value.trim().to_ascii_lowercase().as_str() {
        "none" => Verify::NONE,
        "alloc" => Verify::ALLOC,
        "release" | "free" => Verify::RELEASE,
        "always" => Verify::ALWAYS,
        _ => return Err(invalid("BUFALLOC_VERIFY", &value)),
      };
      config = config.with_verify(verify);
    }

    if let Some(value) = lookup("BUFALLOC_CAPTURE") {
      let capture = match value.trim() {
        "1" | "true" => true,
        "0" | "false" => false,
        _ => return Err(invalid("BUFALLOC_CAPTURE", &value)),
      };
      config = config.with_capture(capture);
    }

    Ok(config)
  }
}

fn invalid(
  key: &'static str,
  value: &str,
) -> ConfigError {
  ConfigError::InvalidValue {
    key,
    value: value.to_owned(),
  }
}
