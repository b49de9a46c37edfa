use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Modelo de reconstrucción por compresión lineal
///
/// Aprende offline un mapeo comprimir/descomprimir (media + subespacio
/// principal por power iteration) y mide el error de reconstrucción de un
/// vector contra la distribución de error del baseline ajustado. Vectores
/// lejos del subespacio aprendido reconstruyen mal y puntúan cerca de 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionModel {
    pub version: String,
    pub feature_count: usize,
    pub mean: Vec<f64>,
    /// Direcciones principales ortonormales (k x d)
    pub components: Vec<Vec<f64>>,
    /// Baseline de error sobre la población de entrenamiento
    pub error_min: f64,
    pub error_max: f64,
}

impl ReconstructionModel {
    /// Ajusta el modelo con `k` componentes, determinista por seed
    pub fn fit(data: &[Vec<f64>], components: usize, iterations: usize, seed: u64) -> Result<Self> {
        ensure!(!data.is_empty(), "empty training population");
        let feature_count = data[0].len();
        ensure!(
            data.iter().all(|row| row.len() == feature_count),
            "inconsistent feature dimensions in training data"
        );
        let k = components.min(feature_count).max(1);

        let mut mean = vec![0.0; feature_count];
        for row in data {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= data.len() as f64;
        }

        let mut centered: Vec<Vec<f64>> = data
            .iter()
            .map(|row| row.iter().zip(&mean).map(|(v, m)| v - m).collect())
            .collect();

        let mut rng = StdRng::seed_from_u64(seed);
        let mut principal = Vec::with_capacity(k);

        for _ in 0..k {
            let mut direction: Vec<f64> =
                (0..feature_count).map(|_| rng.gen_range(-1.0..1.0)).collect();
            normalize(&mut direction);

            for _ in 0..iterations {
                let mut next = vec![0.0; feature_count];
                for row in &centered {
                    let projection = dot(row, &direction);
                    for (n, v) in next.iter_mut().zip(row) {
                        *n += projection * v;
                    }
                }
                if !normalize(&mut next) {
                    break;
                }
                direction = next;
            }

            // Deflación: se remueve la componente encontrada
            for row in &mut centered {
                let projection = dot(row, &direction);
                for (v, d) in row.iter_mut().zip(&direction) {
                    *v -= projection * d;
                }
            }
            principal.push(direction);
        }

        let mut model = Self {
            version: "recon-1".to_string(),
            feature_count,
            mean,
            components: principal,
            error_min: 0.0,
            error_max: 0.0,
        };

        let errors: Vec<f64> = data
            .iter()
            .map(|row| model.reconstruction_error(row))
            .collect();
        model.error_min = errors.iter().cloned().fold(f64::INFINITY, f64::min);
        model.error_max = errors.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        Ok(model)
    }

    /// Error cuadrático de reconstrucción del vector
    fn reconstruction_error(&self, features: &[f64]) -> f64 {
        let centered: Vec<f64> = features
            .iter()
            .zip(&self.mean)
            .map(|(v, m)| v - m)
            .collect();

        let mut reconstructed = vec![0.0; self.feature_count];
        for component in &self.components {
            let projection = dot(&centered, component);
            for (r, c) in reconstructed.iter_mut().zip(component) {
                *r += projection * c;
            }
        }

        centered
            .iter()
            .zip(&reconstructed)
            .map(|(v, r)| (v - r) * (v - r))
            .sum()
    }

    /// Score en [0,1]: error min-max normalizado contra el baseline
    pub fn score(&self, features: &[f64]) -> Result<f64> {
        ensure!(
            features.len() == self.feature_count,
            "feature vector of length {} against model of {}",
            features.len(),
            self.feature_count
        );

        let error = self.reconstruction_error(features);
        let range = self.error_max - self.error_min;
        if range <= f64::EPSILON {
            return Ok(if error > self.error_max { 1.0 } else { 0.0 });
        }
        Ok(((error - self.error_min) / range).clamp(0.0, 1.0))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Normaliza in place; devuelve false ante un vector degenerado
fn normalize(v: &mut [f64]) -> bool {
    let norm = dot(v, v).sqrt();
    if norm <= f64::EPSILON {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}
