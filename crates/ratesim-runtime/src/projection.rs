//! Projections: weighted, optionally delayed connectivity between populations

use crate::{error::*, plasticity::LearningRule, population::Population};
use ratesim_storage::{
    Adjacency, ConnectivityMatrix, Layout, MemoryBudget, PopulationId, ProjectionId, RankWindow,
    StorageError,
};

/// Synaptic weights of a projection
#[derive(Debug, Clone, PartialEq)]
pub enum Weights {
    /// Same weight for every synapse
    Constant(f32),
    /// One weight per synapse, aligned with the adjacency's `pre_ranks`
    PerSynapse(Vec<Vec<f32>>),
}

/// Conduction delays of a projection, in steps
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Delay {
    /// Read the live pre-synaptic rates
    #[default]
    None,
    /// Same delay for every synapse
    Uniform(u32),
    /// One delay per synapse, aligned with the adjacency's `pre_ranks`;
    /// zero entries read the live rates
    PerSynapse(Vec<Vec<u32>>),
}

impl Delay {
    /// History depth the pre-synaptic population needs for this policy
    pub fn max_delay(&self) -> u32 {
        match self {
            Delay::None => 0,
            Delay::Uniform(d) => *d,
            Delay::PerSynapse(delays) => delays.iter().flatten().copied().max().unwrap_or(0),
        }
    }
}

/// Delays resolved against the matrix layout
#[derive(Debug, Clone)]
enum DelayTable {
    None,
    Uniform(u32),
    // Indexed by flat matrix index
    PerSynapse(Vec<u32>),
}

/// Description of a projection handed to the network builder
#[derive(Debug)]
pub struct ProjectionSpec {
    /// Projection name, `pre->post:target` when not given
    pub name: Option<String>,
    /// Pre-synaptic population name
    pub pre: String,
    /// Post-synaptic population name
    pub post: String,
    /// Input target on the post-synaptic side
    pub target: String,
    /// Connectivity in LIL form (global ranks)
    pub adjacency: Adjacency<u32>,
    /// Synaptic weights
    pub weights: Weights,
    /// Conduction delays
    pub delay: Delay,
    /// Optional learning rule
    pub learning: Option<Box<dyn LearningRule>>,
    /// Mask layout
    pub layout: Layout,
    /// Explicit (post, pre) rank windows for partitioned populations
    pub windows: Option<(RankWindow<u32>, RankWindow<u32>)>,
}

impl ProjectionSpec {
    /// Describe a projection with unit weights and no delay
    pub fn new(
        pre: impl Into<String>,
        post: impl Into<String>,
        target: impl Into<String>,
        adjacency: Adjacency<u32>,
    ) -> Self {
        Self {
            name: None,
            pre: pre.into(),
            post: post.into(),
            target: target.into(),
            adjacency,
            weights: Weights::Constant(1.0),
            delay: Delay::None,
            learning: None,
            layout: Layout::default(),
            windows: None,
        }
    }

    /// Set the projection name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the synaptic weights
    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    /// Set the conduction delays
    pub fn with_delay(mut self, delay: Delay) -> Self {
        self.delay = delay;
        self
    }

    /// Attach a learning rule
    pub fn with_learning(mut self, rule: impl LearningRule + 'static) -> Self {
        self.learning = Some(Box::new(rule));
        self
    }

    /// Set the mask layout
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Restrict the matrix to explicit post (row) and pre (column) windows
    pub fn with_windows(mut self, post: RankWindow<u32>, pre: RankWindow<u32>) -> Self {
        self.windows = Some((post, pre));
        self
    }

    /// Name of the projection once built
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}->{}:{}", self.pre, self.post, self.target))
    }
}

fn check_aligned<T>(what: &str, values: &[Vec<T>], adjacency: &Adjacency<u32>) -> Result<()> {
    if values.len() != adjacency.len() {
        return Err(RuntimeError::size_mismatch(what, adjacency.len(), values.len()));
    }
    for (row, pres) in values.iter().zip(&adjacency.pre_ranks) {
        if row.len() != pres.len() {
            return Err(RuntimeError::size_mismatch(what, pres.len(), row.len()));
        }
    }
    Ok(())
}

/// Bytes taken by `count` items of `item_bytes` each, if that fits `u64`
pub(crate) fn byte_count(what: &'static str, count: u128, item_bytes: usize) -> Result<u64> {
    count
        .checked_mul(item_bytes as u128)
        .and_then(|bytes| u64::try_from(bytes).ok())
        .ok_or_else(|| StorageError::index_overflow(what, count, "u64").into())
}

fn window_for(size: usize, what: &str) -> Result<RankWindow<u32>> {
    let len = u32::try_from(size).map_err(|_| {
        RuntimeError::network_topology(format!("{} population of {} neurons exceeds 32-bit ranks", what, size))
    })?;
    Ok(RankWindow::from_len(len))
}

/// A projection between two populations
#[derive(Debug)]
pub struct Projection {
    id: ProjectionId,
    name: String,
    pre: PopulationId,
    post: PopulationId,
    target: String,
    matrix: ConnectivityMatrix,
    weights: Vec<f32>,
    delays: DelayTable,
    learning: Option<Box<dyn LearningRule>>,
    enabled: bool,
}

impl Projection {
    /// Build a projection, ingesting its adjacency into a dense mask
    ///
    /// Fails with a wrapped [`ratesim_storage::StorageError::InsufficientMemory`]
    /// when the mask, weights and delays do not fit the budget.
    pub fn new(
        id: ProjectionId,
        spec: ProjectionSpec,
        pre: &Population,
        post: &Population,
        budget: &MemoryBudget,
    ) -> Result<Self> {
        let name = spec.resolved_name();
        let (rows, columns) = match spec.windows {
            Some(windows) => windows,
            None => (window_for(post.size(), "post")?, window_for(pre.size(), "pre")?),
        };
        if rows.high as usize > post.size() || columns.high as usize > pre.size() {
            return Err(RuntimeError::network_topology(format!(
                "windows [{}, {}) x [{}, {}) exceed population sizes {} x {}",
                rows.low,
                rows.high,
                columns.low,
                columns.high,
                post.size(),
                pre.size()
            )));
        }

        if let Weights::PerSynapse(values) = &spec.weights {
            check_aligned("weights", values, &spec.adjacency)?;
        }
        if let Delay::PerSynapse(values) = &spec.delay {
            check_aligned("delays", values, &spec.adjacency)?;
        }

        let mut matrix = ConnectivityMatrix::from_windows(rows, columns, spec.layout)?;
        let cells = matrix.dense().cells();
        let per_cell = std::mem::size_of::<f32>()
            + match spec.delay {
                Delay::PerSynapse(_) => std::mem::size_of::<u32>(),
                _ => 0,
            };
        let mask_bytes = matrix.dense().required_bytes()?;
        let cell_bytes = byte_count("projection cells", cells as u128, per_cell)?;
        let total = mask_bytes
            .checked_add(cell_bytes)
            .ok_or_else(|| StorageError::index_overflow("projection bytes", cells as u128, "u64"))?;
        budget.check(total)?;
        matrix.init_from_adjacency(&spec.adjacency, budget)?;

        let mut weights = vec![0.0; cells];
        let mut delay_cells = match spec.delay {
            Delay::PerSynapse(_) => vec![0u32; cells],
            _ => Vec::new(),
        };
        for (i, (post_rank, pres)) in spec.adjacency.dendrites().enumerate() {
            for (j, &pre_rank) in pres.iter().enumerate() {
                let idx = flat_index(&matrix, post_rank, pre_rank)?;
                weights[idx] = match &spec.weights {
                    Weights::Constant(w) => *w,
                    Weights::PerSynapse(values) => values[i][j],
                };
                if let Delay::PerSynapse(values) = &spec.delay {
                    delay_cells[idx] = values[i][j];
                }
            }
        }

        let delays = match spec.delay {
            Delay::None | Delay::Uniform(0) => DelayTable::None,
            Delay::Uniform(d) => DelayTable::Uniform(d),
            Delay::PerSynapse(_) => DelayTable::PerSynapse(delay_cells),
        };

        log::debug!(
            "Projection '{}': {} synapses, {} target '{}'",
            name,
            spec.adjacency.nb_synapses(),
            match &delays {
                DelayTable::None => "no delay,".to_string(),
                DelayTable::Uniform(d) => format!("delay {},", d),
                DelayTable::PerSynapse(_) => "per-synapse delays,".to_string(),
            },
            spec.target
        );

        Ok(Self {
            id,
            name,
            pre: pre.id(),
            post: post.id(),
            target: spec.target,
            matrix,
            weights,
            delays,
            learning: spec.learning,
            enabled: true,
        })
    }

    /// Projection ID
    pub fn id(&self) -> ProjectionId {
        self.id
    }

    /// Projection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pre-synaptic population
    pub fn pre(&self) -> PopulationId {
        self.pre
    }

    /// Post-synaptic population
    pub fn post(&self) -> PopulationId {
        self.post
    }

    /// Input target on the post-synaptic side
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Connectivity mask
    pub fn matrix(&self) -> &ConnectivityMatrix {
        &self.matrix
    }

    /// Dense weights, addressed by the matrix flat index
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight of the synapse `pre_rank -> post_rank`, `None` when absent
    pub fn weight(&self, post_rank: u32, pre_rank: u32) -> Result<Option<f32>> {
        let idx = flat_index(&self.matrix, post_rank, pre_rank)?;
        Ok(self.connected(post_rank, pre_rank)?.then(|| self.weights[idx]))
    }

    /// Overwrite the weight of an existing synapse
    pub fn set_weight(&mut self, post_rank: u32, pre_rank: u32, weight: f32) -> Result<()> {
        if !self.connected(post_rank, pre_rank)? {
            return Err(RuntimeError::network_topology(format!(
                "no synapse {} -> {} in '{}'",
                pre_rank, post_rank, self.name
            )));
        }
        let idx = flat_index(&self.matrix, post_rank, pre_rank)?;
        self.weights[idx] = weight;
        Ok(())
    }

    /// Delay of the synapse `pre_rank -> post_rank` in steps, `None` when absent
    pub fn delay(&self, post_rank: u32, pre_rank: u32) -> Result<Option<u32>> {
        if !self.connected(post_rank, pre_rank)? {
            return Ok(None);
        }
        Ok(Some(match &self.delays {
            DelayTable::None => 0,
            DelayTable::Uniform(d) => *d,
            DelayTable::PerSynapse(cells) => cells[flat_index(&self.matrix, post_rank, pre_rank)?],
        }))
    }

    /// History depth this projection reads from its pre-synaptic population
    pub fn max_delay(&self) -> u32 {
        match &self.delays {
            DelayTable::None => 0,
            DelayTable::Uniform(d) => *d,
            DelayTable::PerSynapse(cells) => cells.iter().copied().max().unwrap_or(0),
        }
    }

    /// Number of synapses
    pub fn nb_synapses(&self) -> Result<usize> {
        Ok(self.matrix.dense().nb_synapses()?)
    }

    /// Whether a learning rule is attached
    pub fn has_learning(&self) -> bool {
        self.learning.is_some()
    }

    /// Whether the projection takes part in steps
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable summation and learning
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn connected(&self, post_rank: u32, pre_rank: u32) -> Result<bool> {
        let row = self.matrix.row_window().to_local(post_rank, "row")?;
        let col = self.matrix.column_window().to_local(pre_rank, "column")?;
        Ok(self.matrix.dense().is_set(row, col)?)
    }

    /// Summation phase: add the weighted pre-synaptic input of every
    /// post-synaptic neuron to `sums`
    pub fn compute_sums(&self, pre: &Population, sums: &mut [f32]) -> Result<()> {
        let rows = self.matrix.row_window();
        let columns = self.matrix.column_window();
        let dense = self.matrix.dense();
        if sums.len() < rows.high as usize {
            return Err(RuntimeError::size_mismatch("sums", rows.high as usize, sums.len()));
        }

        let live = pre.rates();
        let source = match &self.delays {
            DelayTable::Uniform(d) => pre.read_delayed(*d)?,
            _ => live,
        };

        let mut delays = Vec::new();
        let mut ranks = Vec::new();
        let mut delayed_weights = Vec::new();

        for row in 0..self.matrix.num_rows() {
            let mut sum = 0.0;
            match &self.delays {
                DelayTable::None | DelayTable::Uniform(_) => {
                    for col in dense.decode_column_indices(row)? {
                        let idx = dense.flat_index(row, col)?;
                        sum += self.weights[idx] * source[(columns.low + col) as usize];
                    }
                }
                DelayTable::PerSynapse(cells) => {
                    delays.clear();
                    ranks.clear();
                    delayed_weights.clear();
                    for col in dense.decode_column_indices(row)? {
                        let idx = dense.flat_index(row, col)?;
                        let pre_rank = (columns.low + col) as usize;
                        match cells[idx] {
                            0 => sum += self.weights[idx] * live[pre_rank],
                            d => {
                                delays.push(d);
                                ranks.push(pre_rank);
                                delayed_weights.push(self.weights[idx]);
                            }
                        }
                    }
                    if !delays.is_empty() {
                        let values = pre.read_delayed_batch(&delays, &ranks)?;
                        sum += values
                            .iter()
                            .zip(&delayed_weights)
                            .map(|(v, w)| v * w)
                            .sum::<f32>();
                    }
                }
            }
            sums[(rows.low + row) as usize] += sum;
        }
        Ok(())
    }

    /// Learning phase: update every weight from the current rates
    pub fn learn(&mut self, pre: &Population, post: &Population, dt: f32) -> Result<()> {
        let rule = match &self.learning {
            Some(rule) => rule,
            None => return Ok(()),
        };
        let rows = self.matrix.row_window();
        let columns = self.matrix.column_window();
        let dense = self.matrix.dense();
        let (pre_rates, post_rates) = (pre.rates(), post.rates());
        let (w_min, w_max) = rule.weight_bounds();

        for row in 0..self.matrix.num_rows() {
            let post_rate = post_rates[(rows.low + row) as usize];
            for col in dense.decode_column_indices(row)? {
                let idx = dense.flat_index(row, col)?;
                let pre_rate = pre_rates[(columns.low + col) as usize];
                self.weights[idx] = rule
                    .update_weight(self.weights[idx], pre_rate, post_rate, dt)
                    .clamp(w_min, w_max);
            }
        }
        Ok(())
    }

    /// Heap bytes held by mask, weights and delays
    pub fn size_in_bytes(&self) -> usize {
        let delays = match &self.delays {
            DelayTable::PerSynapse(cells) => cells.capacity() * std::mem::size_of::<u32>(),
            _ => 0,
        };
        self.matrix.size_in_bytes() + self.weights.capacity() * std::mem::size_of::<f32>() + delays
    }
}

fn flat_index(matrix: &ConnectivityMatrix, post_rank: u32, pre_rank: u32) -> Result<usize> {
    let row = matrix.row_window().to_local(post_rank, "row")?;
    let col = matrix.column_window().to_local(pre_rank, "column")?;
    Ok(matrix.dense().flat_index(row, col)?)
}
