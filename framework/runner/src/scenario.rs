use std::sync::Arc;
use std::time::Duration;

use chain_tunnel_core::prelude::{RequestDescriptor, Transport};
use futures::stream::{self, Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde_json::Value;

/// Attempts to fill one batch slot before giving up on it. A parameter builder declines when the
/// state it needs was never discovered, so another method is drawn instead.
const MAX_BUILD_ATTEMPTS: usize = 8;

/// Where a catalog entry's request goes, and with what parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTarget {
    pub target: String,
    pub params: Value,
}

impl RequestTarget {
    pub fn new(target: impl Into<String>, params: Value) -> Self {
        Self {
            target: target.into(),
            params,
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self::new(path, Value::Null)
    }
}

/// Builds the target of a request from the discovered state. Returns `None` when the state does
/// not hold what the request needs.
pub type ParamBuilder<S> = fn(&S, &mut dyn RngCore) -> Option<RequestTarget>;

pub struct CatalogEntry<S> {
    method: String,
    transport: Transport,
    weight: f64,
    build: ParamBuilder<S>,
}

impl<S> CatalogEntry<S> {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn build(&self, state: &S, rng: &mut dyn RngCore) -> Option<RequestDescriptor> {
        (self.build)(state, rng).map(|t| {
            RequestDescriptor::new(self.method.clone(), self.transport, t.target, t.params)
                .with_weight(self.weight)
        })
    }
}

/// The methods that load can be generated for, in a fixed order.
///
/// Injected by the scenario so that new endpoints need no engine change.
pub struct RequestCatalog<S> {
    entries: Vec<CatalogEntry<S>>,
}

impl<S> Default for RequestCatalog<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S> RequestCatalog<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        method: &str,
        transport: Transport,
        weight: f64,
        build: ParamBuilder<S>,
    ) -> Self {
        if self.get(method).is_some() {
            panic!("Method [{}] is already registered", method);
        }

        self.entries.push(CatalogEntry {
            method: method.to_string(),
            transport,
            weight,
            build,
        });
        self
    }

    pub fn get(&self, method: &str) -> Option<&CatalogEntry<S>> {
        self.entries.iter().find(|e| e.method == method)
    }

    pub fn entries(&self) -> &[CatalogEntry<S>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The catalog's own weights, in registration order.
    pub fn weights(&self) -> WeightTable {
        WeightTable::new(
            self.entries
                .iter()
                .map(|e| (e.method.clone(), e.weight))
                .collect(),
        )
    }
}

/// Ordered `(key, weight)` pairs for weighted sampling.
///
/// Entries with a weight that is not a positive number are kept but never selected.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    entries: Vec<(String, f64)>,
}

impl WeightTable {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    /// Replace the weight for `key`, or append it if it is not present.
    pub fn with_weight(mut self, key: &str, weight: f64) -> Self {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((key.to_string(), weight)),
        }
        self
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn total(&self) -> f64 {
        self.positive().map(|(_, w)| w).sum()
    }

    /// The key whose cumulative weight is the first to strictly exceed `draw`.
    ///
    /// `draw` is expected in `[0, total)`. A draw exactly on a boundary selects the next key.
    pub fn select(&self, draw: f64) -> Option<&str> {
        let mut cumulative = 0.0;
        let mut last = None;
        for (key, weight) in self.positive() {
            cumulative += weight;
            if cumulative > draw {
                return Some(key);
            }
            last = Some(key);
        }

        // Only reachable through floating point error at the top of the range
        last
    }

    /// Draw a key with probability `weight / total`.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Option<&str> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        self.select(rng.gen_range(0.0..total))
    }

    fn positive(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries
            .iter()
            .filter(|(_, w)| w.is_finite() && *w > 0.0)
            .map(|(k, w)| (k.as_str(), *w))
    }
}

/// Turns discovered state into request descriptors by weighted sampling over a catalog.
///
/// Sampling is with replacement. With a seed the sequence of requests is reproducible.
pub struct ScenarioGenerator<S> {
    catalog: Arc<RequestCatalog<S>>,
    weights: WeightTable,
    rng: StdRng,
}

impl<S: Send + Sync + 'static> ScenarioGenerator<S> {
    pub fn new(catalog: Arc<RequestCatalog<S>>, weights: WeightTable, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(catalog, weights, rng)
    }

    pub fn with_rng(catalog: Arc<RequestCatalog<S>>, weights: WeightTable, rng: StdRng) -> Self {
        Self {
            catalog,
            weights,
            rng,
        }
    }

    /// Draw the next request, resampling a few times if the drawn method cannot be built.
    pub fn next_descriptor(&mut self, state: &S) -> Option<RequestDescriptor> {
        for _ in 0..MAX_BUILD_ATTEMPTS {
            let method = self.weights.sample(&mut self.rng)?;
            match self.catalog.get(method) {
                Some(entry) => {
                    if let Some(descriptor) = entry.build(state, &mut self.rng) {
                        return Some(descriptor);
                    }
                }
                None => log::trace!("No catalog entry for weighted method [{}]", method),
            }
        }

        None
    }

    /// A batch of up to `size` requests. Slots that could not be built are dropped.
    pub fn batch(&mut self, state: &S, size: usize) -> Vec<RequestDescriptor> {
        (0..size)
            .filter_map(|_| self.next_descriptor(state))
            .collect()
    }

    /// An unbounded stream of batches with `pause` between them.
    ///
    /// Consumes the generator, a stream can only be restarted by creating a new generator. The
    /// stream ends early if a whole batch comes back empty, since nothing can be built from the
    /// state.
    pub fn into_stream(
        self,
        state: Arc<S>,
        batch_size: usize,
        pause: Duration,
    ) -> impl Stream<Item = RequestDescriptor> + Send + 'static {
        stream::unfold((self, true), move |(mut generator, first)| {
            let state = state.clone();
            async move {
                if !first {
                    tokio::time::sleep(pause).await;
                }

                let batch = generator.batch(&state, batch_size);
                if batch.is_empty() {
                    log::warn!("No requests could be generated from the discovered state, stopping");
                    return None;
                }

                log::trace!("Generated batch of {} requests", batch.len());
                Some((stream::iter(batch), (generator, false)))
            }
        })
        .flatten()
    }
}

/// A named, weighted group of requests executed together.
///
/// The weight scales the pool's base concurrency for this scenario. Requests run in batches of
/// the scaled concurrency, one batch after another.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    name: String,
    weight: f64,
    requests: Vec<RequestDescriptor>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, weight: f64, requests: Vec<RequestDescriptor>) -> Self {
        Self {
            name: name.into(),
            weight,
            requests,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn requests(&self) -> &[RequestDescriptor] {
        &self.requests
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// `ceil(base * weight)`, never less than one.
    pub fn effective_concurrency(&self, base_concurrency: usize) -> usize {
        let scaled = (base_concurrency as f64 * self.weight).ceil();
        if scaled.is_finite() && scaled >= 1.0 {
            scaled as usize
        } else {
            1
        }
    }

    /// Batches of `min(requests, effective concurrency)`, in order.
    pub fn batches(&self, base_concurrency: usize) -> std::slice::Chunks<'_, RequestDescriptor> {
        let size = self
            .effective_concurrency(base_concurrency)
            .min(self.requests.len())
            .max(1);
        self.requests.chunks(size)
    }
}
