//! Activation modules
//!
//! Each module defines two device functions merged ahead of the layer
//! kernels: `nf_activate(x)` and `nf_activate_derivative(sum)`, the latter
//! taking the pre-activation sum.

use serde::{Deserialize, Serialize};

/// Activation applied by a feed-forward layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    #[default]
    Relu,
    LeakyRelu,
    Sigmoid,
    Tanh,
}

impl Activation {
    pub fn source(&self) -> &'static str {
        match self {
            Activation::Identity => IDENTITY,
            Activation::Relu => RELU,
            Activation::LeakyRelu => LEAKY_RELU,
            Activation::Sigmoid => SIGMOID,
            Activation::Tanh => TANH,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Relu => "relu",
            Activation::LeakyRelu => "leaky_relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
        }
    }

    /// Host-side reference of the device function
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.0),
            Activation::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    LEAKY_SLOPE * x
                }
            }
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }

    /// Host-side reference of the device derivative
    pub fn derivative(&self, sum: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Relu => {
                if sum > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu => {
                if sum > 0.0 {
                    1.0
                } else {
                    LEAKY_SLOPE
                }
            }
            Activation::Sigmoid => {
                let s = self.apply(sum);
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = sum.tanh();
                1.0 - t * t
            }
        }
    }
}

const LEAKY_SLOPE: f32 = 0.01;

const IDENTITY: &str = r#"
__device__ __forceinline__ float nf_activate(float x) {
    return x;
}

__device__ __forceinline__ float nf_activate_derivative(float sum) {
    (void)sum;
    return 1.0f;
}
"#;

const RELU: &str = r#"
__device__ __forceinline__ float nf_activate(float x) {
    return x > 0.0f ? x : 0.0f;
}

__device__ __forceinline__ float nf_activate_derivative(float sum) {
    return sum > 0.0f ? 1.0f : 0.0f;
}
"#;

const LEAKY_RELU: &str = r#"
__device__ __forceinline__ float nf_activate(float x) {
    return x > 0.0f ? x : 0.01f * x;
}

__device__ __forceinline__ float nf_activate_derivative(float sum) {
    return sum > 0.0f ? 1.0f : 0.01f;
}
"#;

const SIGMOID: &str = r#"
__device__ __forceinline__ float nf_activate(float x) {
    return 1.0f / (1.0f + expf(-x));
}

__device__ __forceinline__ float nf_activate_derivative(float sum) {
    const float s = 1.0f / (1.0f + expf(-sum));
    return s * (1.0f - s);
}
"#;

const TANH: &str = r#"
__device__ __forceinline__ float nf_activate(float x) {
    return tanhf(x);
}

__device__ __forceinline__ float nf_activate_derivative(float sum) {
    const float t = tanhf(sum);
    return 1.0f - t * t;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Activation; 5] = [
        Activation::Identity,
        Activation::Relu,
        Activation::LeakyRelu,
        Activation::Sigmoid,
        Activation::Tanh,
    ];

    #[test]
    fn test_every_module_defines_both_functions() {
        for activation in ALL {
            let source = activation.source();
            assert!(source.contains("float nf_activate(float x)"), "{:?}", activation);
            assert!(
                source.contains("float nf_activate_derivative(float sum)"),
                "{:?}",
                activation
            );
        }
    }

    #[test]
    fn test_relu_reference() {
        let relu = Activation::Relu;
        assert_eq!(relu.apply(7.0), 7.0);
        assert_eq!(relu.apply(-1.0), 0.0);
        assert_eq!(relu.derivative(1.0), 1.0);
        assert_eq!(relu.derivative(-1.0), 0.0);
    }

    #[test]
    fn test_smooth_activation_derivatives() {
        let h = 1e-3f32;
        for activation in [Activation::Sigmoid, Activation::Tanh, Activation::Identity] {
            for x in [-2.0f32, -0.5, 0.0, 0.5, 2.0] {
                let numeric = (activation.apply(x + h) - activation.apply(x - h)) / (2.0 * h);
                assert!(
                    (numeric - activation.derivative(x)).abs() < 1e-2,
                    "{:?} at {}",
                    activation,
                    x
                );
            }
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Activation::LeakyRelu).unwrap();
        assert_eq!(json, "\"leaky_relu\"");

        let parsed: Activation = serde_json::from_str("\"tanh\"").unwrap();
        assert_eq!(parsed, Activation::Tanh);
        for activation in ALL {
            let round: Activation =
                serde_json::from_str(&format!("\"{}\"", activation.name())).unwrap();
            assert_eq!(round, activation);
        }
    }
}
