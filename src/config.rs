use std::time::Duration;

/// Numeric thresholds shared by every stage of the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// A usage value within this distance of an integer counts as integral.
    pub integrality: f64,
    /// A column is improving iff its reduced cost is below `-reduced_cost`.
    pub reduced_cost: f64,
    /// Magnitudes below this are treated as zero.
    pub zero: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            integrality: 1e-6,
            reduced_cost: 1e-6,
            zero: 1e-9,
        }
    }
}

impl Tolerance {
    pub fn is_integral(&self, value: f64) -> bool {
        (value - value.round()).abs() <= self.integrality
    }

    pub fn is_improving(&self, reduced_cost: f64) -> bool {
        reduced_cost < -self.reduced_cost
    }

    pub fn is_zero(&self, value: f64) -> bool {
        value.abs() <= self.zero
    }

    /// Distance of `value` from the nearest integer, in `[0, 0.5]`.
    pub fn fractionality(value: f64) -> f64 {
        (value - value.round()).abs()
    }
}

/// Order in which live branch nodes are taken off the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSelection {
    /// Most recently created node first.
    #[default]
    DepthFirst,
    /// Node with the lowest parent bound first.
    BestBound,
}

/// Settings for a branch-and-price run.
#[derive(Debug, Clone, PartialEq)]
pub struct BnpConfig {
    pub tolerance: Tolerance,
    /// Cap on master/pricing rounds within a single node.
    pub max_cg_iterations: usize,
    /// Cap on branch nodes processed over the whole search.
    pub max_nodes: usize,
    /// Node budget handed to the integer solver used by primal heuristics.
    pub heuristic_node_limit: usize,
    pub node_selection: NodeSelection,
    /// Worker threads; `0` uses every hardware thread.
    pub num_threads: usize,
    pub time_limit: Option<Duration>,
    pub deduplicate_columns: bool,
    /// Every feasible objective value is an integer, so bounds may be rounded up.
    pub integral_objective: bool,
    pub primal_heuristics: bool,
    /// Cost of an artificial seed column per covered unit.
    pub artificial_penalty: f64,
}

impl Default for BnpConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            max_cg_iterations: 1000,
            max_nodes: 100_000,
            heuristic_node_limit: 10_000,
            node_selection: NodeSelection::default(),
            num_threads: 1,
            time_limit: None,
            deduplicate_columns: true,
            integral_objective: false,
            primal_heuristics: true,
            artificial_penalty: 1e6,
        }
    }
}

impl BnpConfig {
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_cg_iterations(mut self, max_cg_iterations: usize) -> Self {
        self.max_cg_iterations = max_cg_iterations;
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_node_selection(mut self, node_selection: NodeSelection) -> Self {
        self.node_selection = node_selection;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = Some(time_limit);
        self
    }

    pub fn with_deduplication(mut self, deduplicate_columns: bool) -> Self {
        self.deduplicate_columns = deduplicate_columns;
        self
    }

    pub fn with_integral_objective(mut self, integral_objective: bool) -> Self {
        self.integral_objective = integral_objective;
        self
    }

    pub fn with_primal_heuristics(mut self, primal_heuristics: bool) -> Self {
        self.primal_heuristics = primal_heuristics;
        self
    }

    pub fn with_artificial_penalty(mut self, artificial_penalty: f64) -> Self {
        self.artificial_penalty = artificial_penalty;
        self
    }

    /// Resolved worker count.
    pub fn threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.num_threads
        }
    }

    /// Rounds a relaxed bound up when the objective is known to be integral.
    pub fn effective_bound(&self, bound: f64) -> f64 {
        if self.integral_objective && bound.is_finite() {
            (bound - self.tolerance.integrality).ceil()
        } else {
            bound
        }
    }
}
