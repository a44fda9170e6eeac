//! Helper functions and data types

use rand::Rng;

/// Helper for storing idempotent closures/functions with one argument
#[derive(Clone)]
pub struct WrapFunc<Input, Output> {
    name: String,
    func: std::sync::Arc<dyn Fn(Input) -> Output + Send + Sync + 'static>,
}

impl<I, J> WrapFunc<I, J> {
    pub fn new<N, F>(name: N, func: F) -> Self
    where
        N: Into<String>,
        F: Fn(I) -> J + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: std::sync::Arc::new(func),
        }
    }

    pub fn call(&self, input: I) -> J {
        self.func.as_ref()(input)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Shorthand for [`WrapFunc::new`].
macro_rules! wrap {
    ($name:expr, $func:expr) => {
        $crate::utils::WrapFunc::new($name, $func)
    };
}

pub(crate) use wrap;

impl<I, J> std::fmt::Debug for WrapFunc<I, J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<WrapFunc: {}>", self.name)
    }
}

impl<I, J> PartialEq for WrapFunc<I, J> {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq(&other.name)
    }
}

impl<I, J> Eq for WrapFunc<I, J> {}

impl<I, J> PartialOrd for WrapFunc<I, J> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<I, J> Ord for WrapFunc<I, J> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl<I, J> std::hash::Hash for WrapFunc<I, J> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation, or `None` for an empty slice.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
        / values.len() as f64;

    Some(var.sqrt())
}

/// Median of a set of floats. NaNs are ordered last.
pub fn median_of_floats(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Sample from the standard normal distribution (Box-Muller transform).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // gen::<f64>() lies in [0, 1); shift so the logarithm stays finite
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();

    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// `n` evenly spaced values from `start` to `end`, inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
