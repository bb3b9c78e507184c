//! CART regression tree (variance-reduction splits).
//!
//! Nodes live in a flat vector with index links; the root is node 0.
//! Traversal goes left when `row[feature] <= threshold`.

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct Split {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl RegressionTree {
    /// Fit on the rows of `x` selected by `sample` (indices may repeat).
    pub fn fit(x: &[Vec<f64>], y: &[f64], sample: Vec<usize>, params: TreeParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        if sample.is_empty() {
            tree.nodes.push(Node::Leaf { value: 0.0 });
            return tree;
        }
        tree.build(x, y, sample, 0, params);
        tree
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    // NaN goes left.
                    idx = if v > *threshold { *right } else { *left };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    fn build(&mut self, x: &[Vec<f64>], y: &[f64], sample: Vec<usize>, depth: usize, params: TreeParams) -> usize {
        let idx = self.nodes.len();
        let mean = sample.iter().map(|&i| y[i]).sum::<f64>() / sample.len() as f64;
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= params.max_depth || sample.len() < params.min_samples_split.max(2) {
            return idx;
        }
        let first = y[sample[0]];
        if sample.iter().all(|&i| y[i] == first) {
            return idx;
        }

        let Some(split) = best_split(x, y, &sample) else {
            return idx;
        };

        let (left_sample, right_sample): (Vec<usize>, Vec<usize>) =
            sample.into_iter().partition(|&i| x[i][split.feature] <= split.threshold);
        if left_sample.is_empty() || right_sample.is_empty() {
            return idx;
        }

        let left = self.build(x, y, left_sample, depth + 1, params);
        let right = self.build(x, y, right_sample, depth + 1, params);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

/// Lowest total squared error over all features and thresholds.
fn best_split(x: &[Vec<f64>], y: &[f64], sample: &[usize]) -> Option<Split> {
    let n = sample.len();
    let width = x[sample[0]].len();
    let total_sum: f64 = sample.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = sample.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;

    let mut best: Option<Split> = None;
    let mut order: Vec<usize> = sample.to_vec();
    for feature in 0..width {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for pos in 1..n {
            let prev = order[pos - 1];
            left_sum += y[prev];
            left_sq += y[prev] * y[prev];

            let lo = x[prev][feature];
            let hi = x[order[pos]][feature];
            if lo >= hi {
                continue;
            }

            let left_n = pos as f64;
            let right_n = (n - pos) as f64;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n) + (right_sq - right_sum * right_sum / right_n);

            if sse < parent_sse - 1e-12 && best.as_ref().map_or(true, |b| sse < b.sse) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some(Split { feature, threshold, sse });
            }
        }
    }
    best
}
