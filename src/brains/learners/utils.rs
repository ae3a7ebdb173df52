use candle_core::{backprop::GradStore, Result, Tensor, Var};
use candle_nn::{AdamW, Linear, Optimizer, ParamsAdamW, VarBuilder};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

pub fn adam(vars: Vec<Var>, lr: f64, weight_decay: f64) -> Result<AdamW> {
    AdamW::new(
        vars,
        ParamsAdamW {
            lr,
            weight_decay,
            ..Default::default()
        },
    )
}

pub fn linear(in_len: usize, out_len: usize, gain: f64, vs: VarBuilder) -> Result<Linear> {
    let w_init = candle_nn::init::Init::Kaiming {
        dist: candle_nn::init::NormalOrUniform::Normal,
        fan: candle_nn::init::FanInOut::FanIn,
        non_linearity: candle_nn::init::NonLinearity::ExplicitGain(gain),
    };
    let b_init = candle_nn::init::Init::Const(0.0);
    let weight = vs.get_with_hints((out_len, in_len), "weight", w_init)?;
    let bias = vs.get_with_hints((out_len,), "bias", b_init)?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Standardizes a `(batch, 1)` column with statistics of this batch only:
/// `(x - mean) / (std + eps)`, using the unbiased standard deviation.
/// A single-row batch has no spread and normalizes to zero.
pub fn normalize(x: &Tensor, eps: f64) -> Result<Tensor> {
    let n = x.dim(0)?;
    let mean = x.mean_keepdim(0)?;
    let centered = x.broadcast_sub(&mean)?;
    let std = if n > 1 {
        (centered.sqr()?.sum_keepdim(0)? / (n - 1) as f64)?.sqrt()?
    } else {
        mean.zeros_like()?
    };
    centered.broadcast_div(&(std + eps)?)
}

/// Rescales the gradients of `vars` in place so that their global L2 norm is
/// at most `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm(vars: &[Var], grads: &mut GradStore, max_norm: f64) -> Result<f64> {
    let mut total = 0.0f64;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = total.sqrt();
    let coef = max_norm / (norm + 1e-6);
    if coef < 1.0 {
        for var in vars {
            if let Some(grad) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), grad.affine(coef, 0.0)?);
            }
        }
    }
    Ok(norm)
}

/// Ornstein-Uhlenbeck process: `x += theta * (mu - x) + sigma * N(0, 1)`,
/// one independent component per action dimension.
#[derive(Debug, Clone)]
pub struct OuNoise {
    pub mu: f64,
    pub theta: f64,
    pub sigma: f64,
    pub max_sigma: f64,
    pub min_sigma: f64,
    pub decay_period: usize,
    pub action_len: usize,
    t: usize,
    state: Vec<f32>,
    rng: ChaCha8Rng,
}

impl OuNoise {
    pub fn new(
        action_len: usize,
        mu: f64,
        theta: f64,
        max_sigma: f64,
        min_sigma: f64,
        decay_period: usize,
        seed: u64,
    ) -> Self {
        Self {
            mu,
            theta,
            sigma: max_sigma,
            max_sigma,
            min_sigma,
            decay_period,
            action_len,
            t: 0,
            state: vec![mu as f32; action_len],
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> &[f32] {
        &self.state
    }

    fn evolve(&mut self) {
        for x in self.state.iter_mut() {
            let z: f64 = StandardNormal.sample(&mut self.rng);
            let dx = self.theta * (self.mu - *x as f64) + self.sigma * z;
            *x += dx as f32;
        }
    }

    pub fn sample(&mut self) -> Vec<f32> {
        self.evolve();
        self.t += 1;
        self.sigma = self.max_sigma
            - (self.max_sigma - self.min_sigma)
                * 1.0f64.min(self.t as f64 / self.decay_period as f64);
        self.state.clone()
    }

    /// Returns the process to its freshly built state: value `mu`, sigma
    /// back at `max_sigma`.
    pub fn reset(&mut self) {
        self.state.fill(self.mu as f32);
        self.t = 0;
        self.sigma = self.max_sigma;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brains::learners::DEVICE;

    #[test]
    fn test_normalize() -> Result<()> {
        let rewards = Tensor::new(&[[1.0f32], [2.0], [3.0], [10.0], [-4.0]], &DEVICE)?;
        let normed = normalize(&rewards, 1e-5)?;
        let values: Vec<f32> = normed.flatten_all()?.to_vec1()?;
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / (n - 1.0);
        assert!(mean.abs() < 1e-5, "{mean}");
        assert!((var.sqrt() - 1.0).abs() < 1e-4, "{var}");
        Ok(())
    }

    #[test]
    fn test_normalize_constant_batch() -> Result<()> {
        let rewards = Tensor::new(&[[0.5f32], [0.5], [0.5]], &DEVICE)?;
        let values: Vec<f32> = normalize(&rewards, 1e-5)?.flatten_all()?.to_vec1()?;
        assert!(values.iter().all(|v| *v == 0.0));
        let single = Tensor::new(&[[3.0f32]], &DEVICE)?;
        let values: Vec<f32> = normalize(&single, 1e-5)?.flatten_all()?.to_vec1()?;
        assert_eq!(values, vec![0.0]);
        Ok(())
    }

    #[test]
    fn test_clip_grad_norm() -> Result<()> {
        let a = Var::new(&[1.0f32, 2.0], &DEVICE)?;
        let b = Var::new(&[3.0f32], &DEVICE)?;
        let loss = ((a.as_tensor().sqr()?.sum_all()? + b.as_tensor().sqr()?.sum_all()?)?
            * 10.0)?;
        let mut grads = loss.backward()?;
        let vars = vec![a.clone(), b.clone()];
        let norm = clip_grad_norm(&vars, &mut grads, 1.0)?;
        // d/dx 10x^2 = 20x -> [20, 40, 60]
        assert!((norm - (20f64.powi(2) + 40f64.powi(2) + 60f64.powi(2)).sqrt()).abs() < 1e-3);
        let mut clipped = 0.0f32;
        for var in vars.iter() {
            let g = grads.get(var.as_tensor()).unwrap();
            clipped += g.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
        assert!((clipped.sqrt() - 1.0).abs() < 1e-4);

        // Small gradients pass through untouched.
        let c = Var::new(&[0.1f32], &DEVICE)?;
        let mut grads = (c.as_tensor().sum_all()? * 0.5)?.backward()?;
        let norm = clip_grad_norm(&[c.clone()], &mut grads, 1.0)?;
        assert!((norm - 0.5).abs() < 1e-6);
        let g: Vec<f32> = grads.get(c.as_tensor()).unwrap().to_vec1()?;
        assert_eq!(g, vec![0.5]);
        Ok(())
    }

    #[test]
    fn test_ou_noise_evolves_and_resets() {
        let mut noise = OuNoise::new(3, 0.0, 0.15, 0.2, 0.2, 1, 42);
        assert_eq!(noise.state(), &[0.0, 0.0, 0.0]);
        let first = noise.sample();
        let second = noise.sample();
        assert_eq!(first.len(), 3);
        assert_ne!(first, second);
        assert_eq!(noise.state(), second.as_slice());
        noise.reset();
        assert_eq!(noise.state(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_ou_noise_seeded() {
        let mut a = OuNoise::new(2, 0.0, 0.15, 0.2, 0.2, 1, 7);
        let mut b = OuNoise::new(2, 0.0, 0.15, 0.2, 0.2, 1, 7);
        for _ in 0..5 {
            assert_eq!(a.sample(), b.sample());
        }
    }

    #[test]
    fn test_ou_sigma_anneals() {
        let mut noise = OuNoise::new(1, 0.0, 0.15, 0.4, 0.1, 10, 1);
        for _ in 0..5 {
            noise.sample();
        }
        assert!((noise.sigma - 0.25).abs() < 1e-9);
        for _ in 0..20 {
            noise.sample();
        }
        assert!((noise.sigma - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_ou_reset_matches_fresh_process() {
        let mut noise = OuNoise::new(2, 0.0, 0.15, 0.4, 0.1, 10, 1);
        for _ in 0..20 {
            noise.sample();
        }
        noise.reset();
        let fresh = OuNoise::new(2, 0.0, 0.15, 0.4, 0.1, 10, 1);
        assert_eq!(noise.sigma, fresh.sigma);
        assert_eq!(noise.state(), fresh.state());
        noise.sample();
        assert!((noise.sigma - 0.37).abs() < 1e-9);
    }
}
