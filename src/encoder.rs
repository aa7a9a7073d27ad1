//! Transformer encoder for the BERT-family checkpoints
//!
//! Built from candle_nn layers following the layout of candle-transformers'
//! BERT. Two things differ from that implementation:
//!
//! - position ids start at `pad_token_id + 1` for RoBERTa
//! - ALBERT factorizes the embeddings (projected up to the hidden size) and
//!   applies a single shared layer `num_hidden_layers` times

use anyhow::{Context, Result};
use candle::{DType, Module, Tensor};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder, embedding, linear};
use serde::Deserialize;

/// Encoder family selected by `model_type` in config.json
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Bert,
    Roberta,
    Albert,
}

impl EncoderKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Bert => "bert",
            Self::Roberta => "roberta",
            Self::Albert => "albert",
        }
    }
}

/// Subset of a HuggingFace config.json the encoder needs
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EncoderConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default)]
    pub pad_token_id: usize,
    /// ALBERT only: width of the factorized embeddings
    #[serde(default)]
    pub embedding_size: Option<usize>,
    #[serde(default = "default_one")]
    pub num_hidden_groups: usize,
    #[serde(default = "default_one")]
    pub inner_group_num: usize,
}

fn default_hidden_act() -> String {
    "gelu".to_string()
}
fn default_type_vocab_size() -> usize {
    2
}
fn default_layer_norm_eps() -> f64 {
    1e-12
}
fn default_one() -> usize {
    1
}

impl EncoderConfig {
    /// First position id used by a sequence
    pub fn position_offset(&self, kind: EncoderKind) -> usize {
        match kind {
            // RoBERTa numbers positions from padding_idx + 1
            EncoderKind::Roberta => self.pad_token_id + 1,
            EncoderKind::Bert | EncoderKind::Albert => 0,
        }
    }

    /// Longest input, special tokens included, that has a position embedding
    pub fn max_tokens(&self, kind: EncoderKind) -> usize {
        self.max_position_embeddings
            .saturating_sub(self.position_offset(kind))
    }

    fn embedding_width(&self, kind: EncoderKind) -> usize {
        match kind {
            EncoderKind::Albert => self.embedding_size.unwrap_or(self.hidden_size),
            EncoderKind::Bert | EncoderKind::Roberta => self.hidden_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HiddenAct {
    Gelu,
    GeluApprox,
    Relu,
}

impl HiddenAct {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "gelu" => Ok(Self::Gelu),
            "gelu_new" | "gelu_fast" | "gelu_pytorch_tanh" => Ok(Self::GeluApprox),
            "relu" => Ok(Self::Relu),
            other => anyhow::bail!("Unsupported activation '{}'", other),
        }
    }

    fn apply(&self, xs: &Tensor) -> candle::Result<Tensor> {
        match self {
            Self::Gelu => xs.gelu_erf(),
            Self::GeluApprox => xs.gelu(),
            Self::Relu => xs.relu(),
        }
    }
}

/// Older checkpoints store LayerNorm parameters as gamma/beta
fn layer_norm(size: usize, eps: f64, vb: VarBuilder) -> candle::Result<LayerNorm> {
    let (weight, bias) = match (vb.get(size, "weight"), vb.get(size, "bias")) {
        (Ok(weight), Ok(bias)) => (weight, bias),
        (Err(err), _) | (_, Err(err)) => {
            match (vb.get(size, "gamma"), vb.get(size, "beta")) {
                (Ok(weight), Ok(bias)) => (weight, bias),
                _ => return Err(err),
            }
        }
    };
    Ok(LayerNorm::new(weight, bias, eps))
}

struct Embeddings {
    word: Embedding,
    position: Embedding,
    token_type: Embedding,
    layer_norm: LayerNorm,
    position_offset: usize,
}

impl Embeddings {
    fn load(vb: VarBuilder, config: &EncoderConfig, kind: EncoderKind) -> candle::Result<Self> {
        let width = config.embedding_width(kind);
        Ok(Self {
            word: embedding(config.vocab_size, width, vb.pp("word_embeddings"))?,
            position: embedding(
                config.max_position_embeddings,
                width,
                vb.pp("position_embeddings"),
            )?,
            token_type: embedding(config.type_vocab_size, width, vb.pp("token_type_embeddings"))?,
            layer_norm: layer_norm(width, config.layer_norm_eps, vb.pp("LayerNorm"))?,
            position_offset: config.position_offset(kind),
        })
    }

    fn position_ids(&self, seq_len: usize, device: &candle::Device) -> candle::Result<Tensor> {
        let start = self.position_offset as u32;
        Tensor::arange(start, start + seq_len as u32, device)?.unsqueeze(0)
    }

    fn forward(&self, input_ids: &Tensor, token_type_ids: &Tensor) -> candle::Result<Tensor> {
        let (_batch, seq_len) = input_ids.dims2()?;
        let positions = self.position_ids(seq_len, input_ids.device())?;

        let embeddings = self
            .word
            .forward(input_ids)?
            .add(&self.token_type.forward(token_type_ids)?)?
            .broadcast_add(&self.position.forward(&positions)?)?;
        self.layer_norm.forward(&embeddings)
    }
}

struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    layer_norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    /// `attention.self.{query,key,value}` + `attention.output.{dense,LayerNorm}`
    fn load_stacked(vb: VarBuilder, config: &EncoderConfig) -> candle::Result<Self> {
        let hidden = config.hidden_size;
        let inner = vb.pp("self");
        let output = vb.pp("output");
        Ok(Self {
            query: linear(hidden, hidden, inner.pp("query"))?,
            key: linear(hidden, hidden, inner.pp("key"))?,
            value: linear(hidden, hidden, inner.pp("value"))?,
            output: linear(hidden, hidden, output.pp("dense"))?,
            layer_norm: layer_norm(hidden, config.layer_norm_eps, output.pp("LayerNorm"))?,
            num_heads: config.num_attention_heads,
            head_dim: hidden / config.num_attention_heads,
        })
    }

    /// `attention.{query,key,value,dense,LayerNorm}`
    fn load_albert(vb: VarBuilder, config: &EncoderConfig) -> candle::Result<Self> {
        let hidden = config.hidden_size;
        Ok(Self {
            query: linear(hidden, hidden, vb.pp("query"))?,
            key: linear(hidden, hidden, vb.pp("key"))?,
            value: linear(hidden, hidden, vb.pp("value"))?,
            output: linear(hidden, hidden, vb.pp("dense"))?,
            layer_norm: layer_norm(hidden, config.layer_norm_eps, vb.pp("LayerNorm"))?,
            num_heads: config.num_attention_heads,
            head_dim: hidden / config.num_attention_heads,
        })
    }

    fn split_heads(&self, xs: &Tensor) -> candle::Result<Tensor> {
        let (batch, seq_len, _) = xs.dims3()?;
        xs.reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(&self, hidden_states: &Tensor, mask: &Tensor) -> candle::Result<Tensor> {
        let (batch, seq_len, hidden) = hidden_states.dims3()?;

        let query = self.split_heads(&self.query.forward(hidden_states)?)?;
        let key = self.split_heads(&self.key.forward(hidden_states)?)?;
        let value = self.split_heads(&self.value.forward(hidden_states)?)?;

        let scores = (query.matmul(&key.t()?)? / (self.head_dim as f64).sqrt())?;
        let scores = scores.broadcast_add(mask)?;
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;

        let context = probs
            .matmul(&value)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, hidden))?;

        let projected = self.output.forward(&context)?;
        self.layer_norm.forward(&projected.add(hidden_states)?)
    }
}

struct Layer {
    attention: SelfAttention,
    intermediate: Linear,
    output: Linear,
    output_norm: LayerNorm,
    act: HiddenAct,
}

impl Layer {
    fn load_stacked(vb: VarBuilder, config: &EncoderConfig, act: HiddenAct) -> candle::Result<Self> {
        let (hidden, inter) = (config.hidden_size, config.intermediate_size);
        Ok(Self {
            attention: SelfAttention::load_stacked(vb.pp("attention"), config)?,
            intermediate: linear(hidden, inter, vb.pp("intermediate").pp("dense"))?,
            output: linear(inter, hidden, vb.pp("output").pp("dense"))?,
            output_norm: layer_norm(hidden, config.layer_norm_eps, vb.pp("output").pp("LayerNorm"))?,
            act,
        })
    }

    fn load_albert(vb: VarBuilder, config: &EncoderConfig, act: HiddenAct) -> candle::Result<Self> {
        let (hidden, inter) = (config.hidden_size, config.intermediate_size);
        Ok(Self {
            attention: SelfAttention::load_albert(vb.pp("attention"), config)?,
            intermediate: linear(hidden, inter, vb.pp("ffn"))?,
            output: linear(inter, hidden, vb.pp("ffn_output"))?,
            output_norm: layer_norm(hidden, config.layer_norm_eps, vb.pp("full_layer_layer_norm"))?,
            act,
        })
    }

    fn forward(&self, hidden_states: &Tensor, mask: &Tensor) -> candle::Result<Tensor> {
        let attended = self.attention.forward(hidden_states, mask)?;
        let intermediate = self.act.apply(&self.intermediate.forward(&attended)?)?;
        let output = self.output.forward(&intermediate)?;
        self.output_norm.forward(&output.add(&attended)?)
    }
}

enum Layers {
    /// One set of weights per layer
    Stacked(Vec<Layer>),
    /// A single layer reused `repeat` times after projecting the embeddings
    Shared {
        projection: Linear,
        layer: Layer,
        repeat: usize,
    },
}

/// Encoder returning the last hidden state for every input token
pub struct TransformerEncoder {
    embeddings: Embeddings,
    layers: Layers,
}

impl TransformerEncoder {
    /// Load weights, with or without the model type prefix (`roberta.` etc.)
    pub fn load(vb: VarBuilder, config: &EncoderConfig, kind: EncoderKind) -> Result<Self> {
        match Self::load_unprefixed(vb.clone(), config, kind) {
            Ok(encoder) => Ok(encoder),
            Err(err) => Self::load_unprefixed(vb.pp(kind.prefix()), config, kind)
                .with_context(|| format!("Failed to load {} weights ({})", kind.prefix(), err)),
        }
    }

    fn load_unprefixed(vb: VarBuilder, config: &EncoderConfig, kind: EncoderKind) -> Result<Self> {
        let act = HiddenAct::parse(&config.hidden_act)?;
        let embeddings = Embeddings::load(vb.pp("embeddings"), config, kind)?;
        let encoder = vb.pp("encoder");

        let layers = match kind {
            EncoderKind::Bert | EncoderKind::Roberta => Layers::Stacked(
                (0..config.num_hidden_layers)
                    .map(|i| Layer::load_stacked(encoder.pp("layer").pp(i), config, act))
                    .collect::<candle::Result<Vec<_>>>()?,
            ),
            EncoderKind::Albert => {
                if config.num_hidden_groups != 1 || config.inner_group_num != 1 {
                    anyhow::bail!(
                        "ALBERT with {} layer groups of {} layers is not supported",
                        config.num_hidden_groups,
                        config.inner_group_num
                    );
                }
                Layers::Shared {
                    projection: linear(
                        config.embedding_width(kind),
                        config.hidden_size,
                        encoder.pp("embedding_hidden_mapping_in"),
                    )?,
                    layer: Layer::load_albert(
                        encoder.pp("albert_layer_groups.0.albert_layers.0"),
                        config,
                        act,
                    )?,
                    repeat: config.num_hidden_layers,
                }
            }
        };

        Ok(Self { embeddings, layers })
    }

    /// `[batch, tokens]` ids and mask in, `[batch, tokens, hidden]` out
    pub fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle::Result<Tensor> {
        // 1 -> 0, 0 -> -10000, shaped to broadcast over heads and queries
        let mask = attention_mask
            .to_dtype(DType::F32)?
            .affine(10000.0, -10000.0)?
            .unsqueeze(1)?
            .unsqueeze(1)?;

        let mut hidden_states = self.embeddings.forward(input_ids, token_type_ids)?;

        match &self.layers {
            Layers::Stacked(layers) => {
                for layer in layers {
                    hidden_states = layer.forward(&hidden_states, &mask)?;
                }
            }
            Layers::Shared {
                projection,
                layer,
                repeat,
            } => {
                hidden_states = projection.forward(&hidden_states)?;
                for _ in 0..*repeat {
                    hidden_states = layer.forward(&hidden_states, &mask)?;
                }
            }
        }

        Ok(hidden_states)
    }
}

/// Small random checkpoints in the HuggingFace tensor layout
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use candle::Device;
    use std::collections::HashMap;

    pub const VOCAB: usize = 16;
    pub const HIDDEN: usize = 8;

    pub fn tiny_config(kind: EncoderKind) -> EncoderConfig {
        EncoderConfig {
            vocab_size: VOCAB,
            hidden_size: HIDDEN,
            num_hidden_layers: 3,
            num_attention_heads: 2,
            intermediate_size: 16,
            hidden_act: "gelu".to_string(),
            max_position_embeddings: 12,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
            pad_token_id: 1,
            embedding_size: (kind == EncoderKind::Albert).then_some(4),
            num_hidden_groups: 1,
            inner_group_num: 1,
        }
    }

    pub struct Weights(pub HashMap<String, Tensor>);

    impl Weights {
        fn random(&mut self, name: &str, shape: &[usize]) {
            let tensor = Tensor::randn(0f32, 0.1, shape, &Device::Cpu).unwrap();
            self.0.insert(name.to_string(), tensor);
        }

        fn linear(&mut self, name: &str, input: usize, output: usize) {
            self.random(&format!("{name}.weight"), &[output, input]);
            self.random(&format!("{name}.bias"), &[output]);
        }

        fn norm(&mut self, name: &str, size: usize) {
            let ones = Tensor::ones(size, DType::F32, &Device::Cpu).unwrap();
            let zeros = Tensor::zeros(size, DType::F32, &Device::Cpu).unwrap();
            self.0.insert(format!("{name}.weight"), ones);
            self.0.insert(format!("{name}.bias"), zeros);
        }

        fn embeddings(&mut self, prefix: &str, config: &EncoderConfig, width: usize) {
            self.random(&format!("{prefix}.embeddings.word_embeddings.weight"), &[config.vocab_size, width]);
            self.random(
                &format!("{prefix}.embeddings.position_embeddings.weight"),
                &[config.max_position_embeddings, width],
            );
            self.random(
                &format!("{prefix}.embeddings.token_type_embeddings.weight"),
                &[config.type_vocab_size, width],
            );
            self.norm(&format!("{prefix}.embeddings.LayerNorm"), width);
        }

        pub fn builder(self) -> VarBuilder<'static> {
            VarBuilder::from_tensors(self.0, DType::F32, &Device::Cpu)
        }
    }

    pub fn roberta_weights(config: &EncoderConfig) -> Weights {
        let mut w = Weights(HashMap::new());
        w.embeddings("roberta", config, HIDDEN);
        for i in 0..config.num_hidden_layers {
            let layer = format!("roberta.encoder.layer.{i}");
            for name in ["query", "key", "value"] {
                w.linear(&format!("{layer}.attention.self.{name}"), HIDDEN, HIDDEN);
            }
            w.linear(&format!("{layer}.attention.output.dense"), HIDDEN, HIDDEN);
            w.norm(&format!("{layer}.attention.output.LayerNorm"), HIDDEN);
            w.linear(&format!("{layer}.intermediate.dense"), HIDDEN, 16);
            w.linear(&format!("{layer}.output.dense"), 16, HIDDEN);
            w.norm(&format!("{layer}.output.LayerNorm"), HIDDEN);
        }
        w
    }

    pub fn albert_weights(config: &EncoderConfig) -> Weights {
        let mut w = Weights(HashMap::new());
        w.embeddings("albert", config, 4);
        w.linear("albert.encoder.embedding_hidden_mapping_in", 4, HIDDEN);
        let layer = "albert.encoder.albert_layer_groups.0.albert_layers.0";
        for name in ["query", "key", "value", "dense"] {
            w.linear(&format!("{layer}.attention.{name}"), HIDDEN, HIDDEN);
        }
        w.norm(&format!("{layer}.attention.LayerNorm"), HIDDEN);
        w.linear(&format!("{layer}.ffn"), HIDDEN, 16);
        w.linear(&format!("{layer}.ffn_output"), 16, HIDDEN);
        w.norm(&format!("{layer}.full_layer_layer_norm"), HIDDEN);
        w
    }

    /// Write config.json, tokenizer.json and model.safetensors for a tiny ALBERT
    pub fn write_albert_snapshot(dir: &std::path::Path) {
        let config = tiny_config(EncoderKind::Albert);
        let config_json = serde_json::json!({
            "model_type": "albert",
            "vocab_size": config.vocab_size,
            "embedding_size": config.embedding_size,
            "hidden_size": config.hidden_size,
            "num_hidden_layers": config.num_hidden_layers,
            "num_attention_heads": config.num_attention_heads,
            "intermediate_size": config.intermediate_size,
            "hidden_act": "gelu_new",
            "max_position_embeddings": config.max_position_embeddings,
            "type_vocab_size": config.type_vocab_size,
            "pad_token_id": 0
        });
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("config.json"), config_json.to_string()).unwrap();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": {"type": "Whitespace"},
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {"[UNK]": 0, "hello": 1, "world": 2},
                "unk_token": "[UNK]"
            }
        });
        std::fs::write(dir.join("tokenizer.json"), tokenizer_json.to_string()).unwrap();

        let weights = albert_weights(&config);
        candle::safetensors::save(&weights.0, dir.join("model.safetensors")).unwrap();
    }
}
