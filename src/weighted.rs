use rand::Rng;

/// A list of value/weight pairs with a running total, supporting weighted selection with and
/// without replacement.
pub(crate) struct WeightedChoice<T> {
    values: Vec<T>,
    weights: Vec<f64>,
    total: f64,
}

impl<T> WeightedChoice<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            weights: Vec::new(),
            total: 0.0,
        }
    }

    pub fn append(&mut self, value: T, weight: f64) {
        self.total += weight;
        self.values.push(value);
        self.weights.push(weight);
    }

    pub fn extend<I: IntoIterator<Item = (T, f64)>>(&mut self, iterable: I) {
        for (value, weight) in iterable {
            self.append(value, weight);
        }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Draw one value, each with probability `weight / total`.
    pub fn choice<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&T, String> {
        if !(self.total > 0.0) {
            return Err(format!(
                "Cannot choose from {} alternatives with zero total weight",
                self.values.len()
            ));
        }
        let mut target = rng.gen_range(0.0..self.total);
        for (weight, value) in self.weights.iter().zip(self.values.iter()) {
            target -= weight;
            if target < 0.0 {
                return Ok(value);
            }
        }
        Err(format!(
            "Too much total weight? remainder is {:.2} from {:.2} total",
            target, self.total
        ))
    }

    /// Draw `k` distinct values without replacement; after each pick the picked alternative is
    /// removed and the running total reduced. Fails when `k` exceeds the number of alternatives
    /// with non-zero weight.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, k: usize) -> Result<Vec<&T>, String> {
        let available = self.weights.iter().filter(|weight| **weight > 0.0).count();
        if k > available {
            return Err(format!(
                "Cannot sample {} unique alternatives, only {} have non-zero weight",
                k, available
            ));
        }
        let mut weights = self.weights.clone();
        let mut total = self.total;
        let mut result = Vec::with_capacity(k);
        while result.len() < k {
            if !(total > 0.0) {
                return Err(format!(
                    "Cannot sample {} unique alternatives, total weight exhausted after {}",
                    k,
                    result.len()
                ));
            }
            let mut target = rng.gen_range(0.0..total);
            let mut picked = None;
            for (i, weight) in weights.iter().enumerate() {
                target -= weight;
                if target < 0.0 {
                    picked = Some(i);
                    break;
                }
            }
            match picked {
                Some(i) => {
                    result.push(&self.values[i]);
                    total -= weights[i];
                    weights[i] = 0.0;
                }
                None => {
                    return Err(format!(
                        "Too much total weight? remainder is {:.2} from {:.2} total",
                        target, total
                    ))
                }
            }
        }
        Ok(result)
    }
}
