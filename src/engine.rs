//! Inference engine wrapper
//!
//! The cache and the API only see [`InferenceHandle`]. BERT checkpoints run on
//! candle-transformers' `BertModel`; RoBERTa and ALBERT run on
//! [`TransformerEncoder`], which handles their position offset and shared
//! layers.

use crate::encoder::{EncoderConfig, EncoderKind, TransformerEncoder};
use crate::models::{ModelFiles, WeightsFile};
use anyhow::{Context, Result};
use candle::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use std::sync::Arc;
use tokenizers::Tokenizer;

/// A loaded tokenizer + model pair ready to run on input text
pub trait InferenceHandle: Send + Sync {
    /// Per-token hidden states, special tokens included
    fn embed(&self, text: &str) -> Result<Vec<Vec<f32>>>;

    /// Subword tokens without special tokens
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;
}

/// Shared handle stored in the model cache
pub type LoadedModel = Arc<dyn InferenceHandle>;

/// Encoder families the engine can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Bert,
    Roberta,
    Albert,
}

impl Architecture {
    /// Read the architecture from a parsed config.json
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        match config.get("model_type").and_then(|v| v.as_str()) {
            Some("bert") => Ok(Self::Bert),
            Some("roberta") => Ok(Self::Roberta),
            Some("albert") => Ok(Self::Albert),
            Some(other) => anyhow::bail!("Unsupported model architecture '{}'", other),
            None => anyhow::bail!("config.json has no model_type"),
        }
    }

    fn encoder_kind(&self) -> EncoderKind {
        match self {
            Self::Bert => EncoderKind::Bert,
            Self::Roberta => EncoderKind::Roberta,
            Self::Albert => EncoderKind::Albert,
        }
    }
}

enum Backbone {
    Bert(BertModel),
    Encoder(TransformerEncoder),
}

impl Backbone {
    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle::Result<Tensor> {
        match self {
            Self::Bert(model) => model.forward(input_ids, token_type_ids, Some(attention_mask)),
            Self::Encoder(encoder) => encoder.forward(input_ids, token_type_ids, attention_mask),
        }
    }
}

fn var_builder(weights: &WeightsFile, device: &Device) -> Result<VarBuilder<'static>> {
    let builder = match weights {
        WeightsFile::SafeTensors(path) => unsafe {
            VarBuilder::from_mmaped_safetensors(&[path], DTYPE, device)?
        },
        WeightsFile::PyTorch(path) => VarBuilder::from_pth(path, DTYPE, device)?,
    };
    Ok(builder)
}

pub struct EncoderModel {
    backbone: Backbone,
    tokenizer: Tokenizer,
    device: Device,
    max_tokens: usize,
}

impl EncoderModel {
    /// Build the model from resolved artifact files on the given device
    pub fn load(files: &ModelFiles, device: Device) -> Result<Self> {
        let config = std::fs::read_to_string(&files.config)
            .with_context(|| format!("Failed to read {:?}", files.config))?;
        let config: serde_json::Value =
            serde_json::from_str(&config).context("Failed to parse config.json")?;

        let architecture = Architecture::from_config(&config)?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(anyhow::Error::msg)?;
        let variable_builder = var_builder(&files.weights, &device)?;

        let (backbone, max_tokens) = match architecture {
            Architecture::Bert => {
                let max_tokens = config
                    .get("max_position_embeddings")
                    .and_then(|v| v.as_u64())
                    .map(|n| n as usize)
                    .context("config.json has no max_position_embeddings")?;
                let config: Config =
                    serde_json::from_value(config).context("Unsupported config.json contents")?;
                (Backbone::Bert(BertModel::load(variable_builder, &config)?), max_tokens)
            }
            Architecture::Roberta | Architecture::Albert => {
                let kind = architecture.encoder_kind();
                let config: EncoderConfig =
                    serde_json::from_value(config).context("Unsupported config.json contents")?;
                let encoder = TransformerEncoder::load(variable_builder, &config, kind)?;
                (Backbone::Encoder(encoder), config.max_tokens(kind))
            }
        };

        Ok(Self {
            backbone,
            tokenizer,
            device,
            max_tokens,
        })
    }

    /// Token ids, token type ids and attention mask for a single sequence
    fn encode(&self, text: &str) -> Result<(Tensor, Tensor, Tensor)> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(anyhow::Error::msg)?;

        let ids = encoding.get_ids();
        if ids.len() > self.max_tokens {
            anyhow::bail!(
                "Input is {} tokens long, the model accepts at most {}",
                ids.len(),
                self.max_tokens
            );
        }

        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask =
            Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        Ok((input_ids, token_type_ids, attention_mask))
    }
}

impl InferenceHandle for EncoderModel {
    fn embed(&self, text: &str) -> Result<Vec<Vec<f32>>> {
        let (input_ids, token_type_ids, attention_mask) = self.encode(text)?;

        let hidden_states = self
            .backbone
            .forward(&input_ids, &token_type_ids, &attention_mask)?;

        // [1, tokens, hidden] -> [tokens, hidden]
        let embeddings = hidden_states
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec2::<f32>()?;

        Ok(embeddings)
    }

    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(anyhow::Error::msg)?;
        Ok(encoding.get_tokens().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::download_model_files;
    use serde_json::json;

    #[test]
    fn test_architecture_from_config() {
        assert_eq!(
            Architecture::from_config(&json!({"model_type": "bert"})).unwrap(),
            Architecture::Bert
        );
        assert_eq!(
            Architecture::from_config(&json!({"model_type": "roberta"})).unwrap(),
            Architecture::Roberta
        );
        assert_eq!(
            Architecture::from_config(&json!({"model_type": "albert"})).unwrap(),
            Architecture::Albert
        );
    }

    #[test]
    fn test_architecture_rejects_unknown() {
        let err = Architecture::from_config(&json!({"model_type": "gpt2"})).unwrap_err();
        assert!(err.to_string().contains("gpt2"));
        assert!(Architecture::from_config(&json!({})).is_err());
    }

    #[test]
    fn test_load_rejects_unsupported_architecture_before_weights() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = temp_dir.path().join("config.json");
        std::fs::write(
            &config,
            r#"{"model_type": "t5", "max_position_embeddings": 512}"#,
        )
        .unwrap();

        let files = ModelFiles {
            config,
            tokenizer: temp_dir.path().join("tokenizer.json"),
            weights: WeightsFile::SafeTensors(temp_dir.path().join("model.safetensors")),
        };

        let err = match EncoderModel::load(&files, Device::Cpu) {
            Ok(_) => panic!("t5 config should be rejected"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("Unsupported model architecture"));
    }

    async fn load_from_hub(remote_id: &str) -> (tempfile::TempDir, ModelFiles, EncoderModel) {
        let temp_dir = tempfile::tempdir().unwrap();
        let files = download_model_files(remote_id, temp_dir.path())
            .await
            .expect("download failed");
        let model = EncoderModel::load(&files, Device::Cpu).expect("load failed");
        (temp_dir, files, model)
    }

    #[tokio::test]
    #[ignore = "requires network"]
    async fn test_bert_embeddings_match_hand_built_encoder() {
        let (_dir, files, model) = load_from_hub("bert-base-uncased").await;

        // [CLS] hello world [SEP]
        let embeddings = model.embed("Hello world").unwrap();
        assert_eq!(embeddings.len(), 4);
        assert!(embeddings.iter().all(|v| v.len() == 768));

        let config: EncoderConfig =
            serde_json::from_str(&std::fs::read_to_string(&files.config).unwrap()).unwrap();
        let vb = var_builder(&files.weights, &Device::Cpu).unwrap();
        let encoder = TransformerEncoder::load(vb, &config, EncoderKind::Bert).unwrap();

        let (ids, types, mask) = model.encode("Hello world").unwrap();
        let reference = encoder
            .forward(&ids, &types, &mask)
            .unwrap()
            .squeeze(0)
            .unwrap()
            .to_vec2::<f32>()
            .unwrap();

        for (token, expected) in embeddings.iter().zip(&reference) {
            for (a, b) in token.iter().zip(expected) {
                assert!((a - b).abs() < 1e-3, "{a} vs {b}");
            }
        }
    }

    #[tokio::test]
    #[ignore = "requires network"]
    async fn test_bert_rejects_overlong_input() {
        let (_dir, _files, model) = load_from_hub("bert-base-uncased").await;

        let text = vec!["hello"; 600].join(" ");
        let err = model.embed(&text).unwrap_err();
        assert!(err.to_string().contains("at most 512"));
        assert_eq!(model.tokenize(&text).unwrap().len(), 600);
    }

    #[tokio::test]
    #[ignore = "requires network"]
    async fn test_roberta_embeddings() {
        let (_dir, _files, model) = load_from_hub("roberta-base").await;

        // <s> Hello Ġworld </s>
        let embeddings = model.embed("Hello world").unwrap();
        assert_eq!(embeddings.len(), 4);
        assert!(embeddings.iter().all(|v| v.len() == 768));
        assert!(embeddings.iter().flatten().all(|v| v.is_finite()));
        assert_eq!(model.tokenize("Hello world").unwrap(), vec!["Hello", "Ġworld"]);
        assert_eq!(model.max_tokens, 512);
    }

    #[tokio::test]
    #[ignore = "requires network"]
    async fn test_albert_embeddings() {
        let (_dir, _files, model) = load_from_hub("albert-base-v2").await;

        // [CLS] ▁hello ▁world [SEP]
        let embeddings = model.embed("Hello world").unwrap();
        assert_eq!(embeddings.len(), 4);
        assert!(embeddings.iter().all(|v| v.len() == 768));
        assert!(embeddings.iter().flatten().all(|v| v.is_finite()));
    }
}
