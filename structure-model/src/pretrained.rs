//! Pretrained text-sequence collaborator: tokenizer + safetensors weights
//! + a bidirectional transformer encoder forward pass on CPU tensors.
//!
//! The checkpoint directory holds `tokenizer.json`, `config.json` and
//! `model.safetensors` with the tensor names listed in [`LayerWeights`].

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::ops::softmax;
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::{ModelError, ModelResult};
use crate::text::SequenceModel;
use crate::weights::TensorMap;

/// Architecture parameters read from the checkpoint's `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    pub hidden_size: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    pub intermediate_size: usize,
    pub max_positions: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

struct EmbeddingWeights {
    word: Tensor,
    position: Tensor,
    norm_weight: Tensor,
    norm_bias: Tensor,
}

struct AttentionWeights {
    query_w: Tensor,
    query_b: Tensor,
    key_w: Tensor,
    key_b: Tensor,
    value_w: Tensor,
    value_b: Tensor,
    output_w: Tensor,
    output_b: Tensor,
    norm_w: Tensor,
    norm_b: Tensor,
}

struct FfnWeights {
    intermediate_w: Tensor,
    intermediate_b: Tensor,
    output_w: Tensor,
    output_b: Tensor,
    norm_w: Tensor,
    norm_b: Tensor,
}

struct LayerWeights {
    attention: AttentionWeights,
    ffn: FfnWeights,
}

impl LayerWeights {
    fn from_map(map: &TensorMap, index: usize, config: &EncoderConfig) -> ModelResult<Self> {
        let h = config.hidden_size;
        let i = config.intermediate_size;
        let att = |part: &str| format!("layers.{index}.attention.{part}");
        let ffn = |part: &str| format!("layers.{index}.ffn.{part}");
        Ok(Self {
            attention: AttentionWeights {
                query_w: map.get(&att("query.weight"), &[h, h])?,
                query_b: map.get(&att("query.bias"), &[h])?,
                key_w: map.get(&att("key.weight"), &[h, h])?,
                key_b: map.get(&att("key.bias"), &[h])?,
                value_w: map.get(&att("value.weight"), &[h, h])?,
                value_b: map.get(&att("value.bias"), &[h])?,
                output_w: map.get(&att("output.weight"), &[h, h])?,
                output_b: map.get(&att("output.bias"), &[h])?,
                norm_w: map.get(&att("norm.weight"), &[h])?,
                norm_b: map.get(&att("norm.bias"), &[h])?,
            },
            ffn: FfnWeights {
                intermediate_w: map.get(&ffn("intermediate.weight"), &[i, h])?,
                intermediate_b: map.get(&ffn("intermediate.bias"), &[i])?,
                output_w: map.get(&ffn("output.weight"), &[h, i])?,
                output_b: map.get(&ffn("output.bias"), &[h])?,
                norm_w: map.get(&ffn("norm.weight"), &[h])?,
                norm_b: map.get(&ffn("norm.bias"), &[h])?,
            },
        })
    }
}

/// Frozen pretrained sequence encoder.
///
/// Weights are immutable after [`PretrainedEncoder::load`]; every call runs
/// a read-only forward pass, so concurrent use needs no locking.
pub struct PretrainedEncoder {
    tokenizer: Tokenizer,
    config: EncoderConfig,
    embeddings: EmbeddingWeights,
    layers: Vec<LayerWeights>,
    device: Device,
}

impl PretrainedEncoder {
    pub fn load(model_dir: &Path, device: &Device) -> ModelResult<Self> {
        let config_raw = std::fs::read_to_string(model_dir.join("config.json"))
            .map_err(|e| ModelError::Load(format!("config.json: {e}")))?;
        let config: EncoderConfig = serde_json::from_str(&config_raw)
            .map_err(|e| ModelError::Load(format!("config.json: {e}")))?;
        if config.hidden_size == 0 || config.hidden_size % config.num_heads != 0 {
            return Err(ModelError::shape(
                "pretrained encoder",
                format!("hidden size divisible by {} heads", config.num_heads),
                config.hidden_size,
            ));
        }

        let tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;

        let map = TensorMap::load(&model_dir.join("model.safetensors"), device)?;
        let h = config.hidden_size;
        let word = map.get_any("embeddings.word.weight")?;
        if word.dims().len() != 2 || word.dims()[1] != h {
            return Err(ModelError::shape(
                "pretrained encoder",
                format!("word embeddings with {h} columns"),
                format!("dims {:?}", word.dims()),
            ));
        }
        let embeddings = EmbeddingWeights {
            word,
            position: map.get("embeddings.position.weight", &[config.max_positions, h])?,
            norm_weight: map.get("embeddings.norm.weight", &[h])?,
            norm_bias: map.get("embeddings.norm.bias", &[h])?,
        };
        let layers = (0..config.num_layers)
            .map(|i| LayerWeights::from_map(&map, i, &config))
            .collect::<ModelResult<Vec<_>>>()?;

        info!(
            "pretrained encoder loaded from {}: {} layers, hidden size {}",
            model_dir.display(),
            config.num_layers,
            config.hidden_size
        );

        Ok(Self {
            tokenizer,
            config,
            embeddings,
            layers,
            device: device.clone(),
        })
    }

    fn attention(&self, hidden: &Tensor, att: &AttentionWeights) -> ModelResult<Tensor> {
        let (seq_len, h) = hidden.dims2()?;
        let heads = self.config.num_heads;
        let head_dim = h / heads;

        let split = |t: Tensor| -> ModelResult<Tensor> {
            Ok(t.reshape((seq_len, heads, head_dim))?
                .transpose(0, 1)?
                .contiguous()?)
        };
        let query = split(linear(hidden, &att.query_w, &att.query_b)?)?;
        let key = split(linear(hidden, &att.key_w, &att.key_b)?)?;
        let value = split(linear(hidden, &att.value_w, &att.value_b)?)?;

        let scores = (query.matmul(&key.transpose(1, 2)?.contiguous()?)?
            / (head_dim as f64).sqrt())?;
        let probs = softmax(&scores, 2)?;
        let context = probs
            .matmul(&value)?
            .transpose(0, 1)?
            .contiguous()?
            .reshape((seq_len, h))?;
        linear(&context, &att.output_w, &att.output_b)
    }

    fn layer_forward(&self, hidden: &Tensor, layer: &LayerWeights) -> ModelResult<Tensor> {
        let eps = self.config.layer_norm_eps;

        let attention_out = self.attention(hidden, &layer.attention)?;
        let hidden = layer_norm(
            &(hidden + &attention_out)?,
            &layer.attention.norm_w,
            &layer.attention.norm_b,
            eps,
        )?;

        let intermediate =
            linear(&hidden, &layer.ffn.intermediate_w, &layer.ffn.intermediate_b)?.gelu()?;
        let ffn_out = linear(&intermediate, &layer.ffn.output_w, &layer.ffn.output_b)?;
        layer_norm(
            &(&hidden + &ffn_out)?,
            &layer.ffn.norm_w,
            &layer.ffn.norm_b,
            eps,
        )
    }
}

impl SequenceModel for PretrainedEncoder {
    fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn hidden_states(&self, text: &str) -> ModelResult<Tensor> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
        let mut ids: Vec<u32> = encoding.get_ids().to_vec();
        ids.truncate(self.config.max_positions);
        if ids.is_empty() {
            return Ok(Tensor::zeros(
                (1, self.config.hidden_size),
                DType::F32,
                &self.device,
            )?);
        }

        let seq_len = ids.len();
        let input_ids = Tensor::from_vec(ids, seq_len, &self.device)?;
        let word = self.embeddings.word.index_select(&input_ids, 0)?;
        let position_ids: Vec<u32> = (0..seq_len as u32).collect();
        let position_ids = Tensor::from_vec(position_ids, seq_len, &self.device)?;
        let position = self.embeddings.position.index_select(&position_ids, 0)?;

        let mut hidden = layer_norm(
            &(word + position)?,
            &self.embeddings.norm_weight,
            &self.embeddings.norm_bias,
            self.config.layer_norm_eps,
        )?;
        for layer in &self.layers {
            hidden = self.layer_forward(&hidden, layer)?;
        }
        Ok(hidden)
    }
}

/// `y = x W^T + b` over `[S, in]` rows.
fn linear(x: &Tensor, weight: &Tensor, bias: &Tensor) -> ModelResult<Tensor> {
    Ok(x.matmul(&weight.t()?)?.broadcast_add(bias)?)
}

/// Layer norm over the last dimension of `[S, H]`.
fn layer_norm(x: &Tensor, weight: &Tensor, bias: &Tensor, eps: f64) -> ModelResult<Tensor> {
    let mean = x.mean_keepdim(1)?;
    let centered = x.broadcast_sub(&mean)?;
    let variance = centered.sqr()?.mean_keepdim(1)?;
    let normalized = centered.broadcast_div(&(variance + eps)?.sqrt()?)?;
    Ok(normalized.broadcast_mul(weight)?.broadcast_add(bias)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_with_default_eps() {
        let raw = r#"{
            "hidden_size": 768,
            "num_layers": 6,
            "num_heads": 12,
            "intermediate_size": 3072,
            "max_positions": 512
        }"#;
        let config: EncoderConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.hidden_size, 768);
        assert_eq!(config.layer_norm_eps, 1e-12);
    }

    #[test]
    fn layer_norm_centers_and_scales() {
        let device = Device::Cpu;
        let x = Tensor::from_vec(vec![1.0f32, 3.0, 2.0, 4.0], (2, 2), &device).unwrap();
        let weight = Tensor::from_vec(vec![1.0f32, 1.0], 2, &device).unwrap();
        let bias = Tensor::from_vec(vec![0.0f32, 0.0], 2, &device).unwrap();
        let out = layer_norm(&x, &weight, &bias, 1e-12).unwrap();
        let values: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        // Each row normalizes to (-1, 1) for inputs one unit either side of
        // the row mean.
        for pair in values.chunks(2) {
            assert!((pair[0] + 1.0).abs() < 1e-4);
            assert!((pair[1] - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn linear_applies_bias() {
        let device = Device::Cpu;
        let x = Tensor::from_vec(vec![1.0f32, 2.0], (1, 2), &device).unwrap();
        let w = Tensor::from_vec(vec![1.0f32, 0.0, 0.0, 1.0], (2, 2), &device).unwrap();
        let b = Tensor::from_vec(vec![10.0f32, 20.0], 2, &device).unwrap();
        let y = linear(&x, &w, &b).unwrap();
        let values: Vec<f32> = y.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(values, vec![11.0, 22.0]);
    }
}
