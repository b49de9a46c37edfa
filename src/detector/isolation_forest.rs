use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Constante de Euler-Mascheroni para la longitud de camino esperada
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Nodo de un árbol de aislamiento, almacenado en arena
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "node")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// Árbol de particiones aleatorias
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    pub nodes: Vec<TreeNode>,
    pub root: usize,
}

impl IsolationTree {
    /// Longitud de camino hasta aislar el vector, con el ajuste estándar
    /// por tamaño de hoja
    fn path_length(&self, features: &[f64]) -> f64 {
        let mut index = self.root;
        let mut depth = 0.0;

        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { size } => {
                    return depth + average_path_length(*size);
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    depth += 1.0;
                    index = if features.get(*feature).copied().unwrap_or(0.0) < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Modelo de particionamiento estilo isolation forest
///
/// Ajustado offline sobre una población de referencia y cargado al arranque
/// como función de scoring inmutable. Caminos de aislamiento cortos
/// relativos a `c(n)` producen scores cercanos a 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForestModel {
    pub version: String,
    pub feature_count: usize,
    pub sample_size: usize,
    pub trees: Vec<IsolationTree>,
}

impl IsolationForestModel {
    /// Ajusta el bosque con submuestreo determinista por seed
    pub fn fit(data: &[Vec<f64>], num_trees: usize, sample_size: usize, seed: u64) -> Result<Self> {
        ensure!(!data.is_empty(), "empty training population");
        ensure!(num_trees > 0, "num_trees must be positive");
        let feature_count = data[0].len();
        ensure!(
            data.iter().all(|row| row.len() == feature_count),
            "inconsistent feature dimensions in training data"
        );

        let mut rng = StdRng::seed_from_u64(seed);
        let effective_sample = sample_size.min(data.len());
        let max_depth = (effective_sample as f64).log2().ceil() as usize;

        let trees = (0..num_trees)
            .map(|_| {
                let picked = rand::seq::index::sample(&mut rng, data.len(), effective_sample);
                let rows: Vec<usize> = picked.into_iter().collect();
                let mut nodes = Vec::new();
                let root = build_node(&mut nodes, data, &rows, 0, max_depth, &mut rng);
                IsolationTree { nodes, root }
            })
            .collect();

        Ok(Self {
            version: "if-1".to_string(),
            feature_count,
            sample_size: effective_sample,
            trees,
        })
    }

    /// Score de anomalía en [0,1]: `2^(-E[h]/c(n))`
    pub fn score(&self, features: &[f64]) -> Result<f64> {
        ensure!(
            features.len() == self.feature_count,
            "feature vector of length {} against model of {}",
            features.len(),
            self.feature_count
        );

        let total: f64 = self.trees.iter().map(|t| t.path_length(features)).sum();
        let mean_path = total / self.trees.len() as f64;
        let expected = average_path_length(self.sample_size);
        if expected <= 0.0 {
            return Ok(0.0);
        }

        Ok(2f64.powf(-mean_path / expected).clamp(0.0, 1.0))
    }
}

/// Construye un nodo y devuelve su índice en la arena
fn build_node(
    nodes: &mut Vec<TreeNode>,
    data: &[Vec<f64>],
    rows: &[usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> usize {
    if depth >= max_depth || rows.len() <= 1 {
        nodes.push(TreeNode::Leaf { size: rows.len() });
        return nodes.len() - 1;
    }

    // Solo tienen sentido las características con rango no degenerado
    let feature_count = data[rows[0]].len();
    let mut candidates = Vec::new();
    for feature in 0..feature_count {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &row in rows {
            let v = data[row][feature];
            min = min.min(v);
            max = max.max(v);
        }
        if max > min {
            candidates.push((feature, min, max));
        }
    }

    if candidates.is_empty() {
        nodes.push(TreeNode::Leaf { size: rows.len() });
        return nodes.len() - 1;
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(min..max);

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .copied()
        .partition(|&row| data[row][feature] < threshold);

    let left = build_node(nodes, data, &left_rows, depth + 1, max_depth, rng);
    let right = build_node(nodes, data, &right_rows, depth + 1, max_depth, rng);
    nodes.push(TreeNode::Split {
        feature,
        threshold,
        left,
        right,
    });
    nodes.len() - 1
}

/// Longitud media de camino de una búsqueda fallida en BST: `c(n)`
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER_GAMMA;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Población sintética apretada alrededor de un punto benigno
    fn baseline(count: usize, dims: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| (0..dims).map(|_| rng.gen_range(0.0..0.2)).collect())
            .collect()
    }

    #[test]
    fn test_scores_are_bounded() {
        let data = baseline(400, 8, 7);
        let model = IsolationForestModel::fit(&data, 50, 128, 7).unwrap();

        for row in data.iter().take(50) {
            let score = model.score(row).unwrap();
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_outlier_scores_higher_than_inliers() {
        let data = baseline(400, 8, 11);
        let model = IsolationForestModel::fit(&data, 100, 256, 11).unwrap();

        let inlier_score = model.score(&data[0]).unwrap();
        let outlier = vec![1.0; 8];
        let outlier_score = model.score(&outlier).unwrap();

        assert!(outlier_score > inlier_score);
        assert!(outlier_score >= 0.6, "outlier score {}", outlier_score);
    }

    #[test]
    fn test_fit_is_deterministic_per_seed() {
        let data = baseline(200, 6, 3);
        let a = IsolationForestModel::fit(&data, 20, 64, 99).unwrap();
        let b = IsolationForestModel::fit(&data, 20, 64, 99).unwrap();

        let probe = vec![0.9; 6];
        assert_eq!(a.score(&probe).unwrap(), b.score(&probe).unwrap());
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let data = baseline(100, 6, 5);
        let model = IsolationForestModel::fit(&data, 10, 64, 5).unwrap();
        assert!(model.score(&[0.0; 3]).is_err());
    }

    #[test]
    fn test_rejects_empty_population() {
        assert!(IsolationForestModel::fit(&[], 10, 64, 1).is_err());
    }
}
