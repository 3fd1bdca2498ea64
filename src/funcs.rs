//! The generator function registry and the built-in functions.

use crate::{Functions, GenerationError, NativeFunction};
use rand::Rng;
use std::collections::HashMap;

/// Names of the always registered built-in functions; they count as used whether or not the
/// grammar calls them.
pub(crate) const BUILTIN_NAMES: [&str; 3] = ["rndflt", "rndint", "rndpow2"];

pub(crate) enum FuncImpl {
    Builtin(Builtin),
    Native(NativeFunction),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Builtin {
    /// `rndint(a, b)`: a uniformly random integer in `[a, b]`.
    RndInt,
    /// `rndflt(a, b)`: a uniform real in `[a, b]`.
    RndFlt,
    /// `rndpow2(exp_limit, variation)`: `2^k + j` with `k` in `[0, exp_limit]` and `j` in
    /// `[-variation, variation]`, for edge values around powers of two.
    RndPow2,
}

impl Default for Functions {
    fn default() -> Self {
        Self::new()
    }
}

impl Functions {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert("rndint".to_string(), FuncImpl::Builtin(Builtin::RndInt));
        map.insert("rndflt".to_string(), FuncImpl::Builtin(Builtin::RndFlt));
        map.insert("rndpow2".to_string(), FuncImpl::Builtin(Builtin::RndPow2));
        Self { map }
    }

    /// Register a generator function under the given name, replacing any previous registration.
    /// Registering one of the built-in names shadows the built-in.
    pub fn register<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&[String]) -> Result<String, GenerationError> + 'static,
    {
        self.map
            .insert(name.to_string(), FuncImpl::Native(Box::new(function)));
        self
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|name| name.as_str())
    }

    pub(crate) fn call<R: Rng + ?Sized>(
        &self,
        name: &str,
        args: &[String],
        rng: &mut R,
    ) -> Result<String, GenerationError> {
        match self.map.get(name) {
            Some(FuncImpl::Native(function)) => function(args),
            Some(FuncImpl::Builtin(builtin)) => builtin.call(name, args, rng),
            None => Err(GenerationError::bare(format!(
                "Function {} used but not defined",
                name
            ))),
        }
    }
}

impl Builtin {
    fn call<R: Rng + ?Sized>(
        &self,
        name: &str,
        args: &[String],
        rng: &mut R,
    ) -> Result<String, GenerationError> {
        if args.len() != 2 {
            return Err(GenerationError::bare(format!(
                "{} expects 2 arguments, got {}",
                name,
                args.len()
            )));
        }
        match self {
            Builtin::RndInt => {
                let a = int_arg(name, &args[0])?;
                let b = int_arg(name, &args[1])?;
                if a > b {
                    return Err(GenerationError::bare(format!(
                        "Empty range [{}, {}] passed to {}",
                        a, b, name
                    )));
                }
                Ok(rng.gen_range(a..=b).to_string())
            }
            Builtin::RndFlt => {
                let a = float_arg(name, &args[0])?;
                let b = float_arg(name, &args[1])?;
                Ok(format!("{}", a + (b - a) * rng.gen::<f64>()))
            }
            Builtin::RndPow2 => {
                let exp_limit = int_arg(name, &args[0])?;
                let variation = int_arg(name, &args[1])?;
                if !(0..=100).contains(&exp_limit) {
                    return Err(GenerationError::bare(format!(
                        "Exponent limit {} passed to {} is outside [0, 100]",
                        exp_limit, name
                    )));
                }
                if variation < 0 {
                    return Err(GenerationError::bare(format!(
                        "Negative variation {} passed to {}",
                        variation, name
                    )));
                }
                let exponent = rng.gen_range(0..=exp_limit as u32);
                let jitter = rng.gen_range(-variation..=variation) as i128;
                Ok(((1i128 << exponent) + jitter).to_string())
            }
        }
    }
}

/// Arguments reach the builtins as strings; a float formatted value (e.g. a `1e2` literal in the
/// grammar) truncates toward zero, so `rndint(a, b)` draws from `[⌊a⌋, ⌊b⌋]`.
fn int_arg(fname: &str, arg: &str) -> Result<i64, GenerationError> {
    let trimmed = arg.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.trunc() as i64),
        _ => Err(GenerationError::bare(format!(
            "Invalid argument to {}: {}",
            fname, arg
        ))),
    }
}

fn float_arg(fname: &str, arg: &str) -> Result<f64, GenerationError> {
    arg.trim()
        .parse::<f64>()
        .map_err(|_| GenerationError::bare(format!("Invalid argument to {}: {}", fname, arg)))
}
