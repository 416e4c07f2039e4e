use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{AnnotatedSentence, Annotation, Annotator, DependencyEdge, ParseTree, Token, TokenRef};
use crate::config::AnnotatorConfig;
use crate::error::{Result, TrialGraphError};

/// Response structure of a CoreNLP server asked for `outputFormat=json`
#[derive(Deserialize)]
struct CoreNlpDocument {
    sentences: Vec<CoreNlpSentence>,
}

#[derive(Deserialize)]
struct CoreNlpSentence {
    parse: Option<String>,
    #[serde(rename = "enhancedPlusPlusDependencies")]
    dependencies: Option<Vec<CoreNlpDependency>>,
    tokens: Vec<CoreNlpToken>,
}

#[derive(Deserialize)]
struct CoreNlpDependency {
    dep: String,
    governor: usize,
    #[serde(rename = "governorGloss")]
    governor_gloss: String,
    dependent: usize,
    #[serde(rename = "dependentGloss")]
    dependent_gloss: String,
}

#[derive(Deserialize)]
struct CoreNlpToken {
    index: usize,
    word: String,
    #[serde(rename = "characterOffsetBegin")]
    begin: usize,
    #[serde(rename = "characterOffsetEnd")]
    end: usize,
}

/// Client for a Stanford CoreNLP server
///
/// One client (and its connection pool) is shared by every document of a build.
pub struct CoreNlpClient {
    client: Client,
    url: String,
    properties: String,
}

impl CoreNlpClient {
    /// Create a client from the `[annotator]` configuration
    pub fn new(config: &AnnotatorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TrialGraphError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let properties = serde_json::json!({
            "annotators": config.annotators,
            "ssplit.boundaryTokenRegex": config.boundary_token_regex,
            "outputFormat": "json",
        })
        .to_string();

        Ok(Self {
            client,
            url: config.url.clone(),
            properties,
        })
    }
}

#[async_trait]
impl Annotator for CoreNlpClient {
    async fn annotate(&self, text: &str) -> Result<Annotation> {
        let response = self
            .client
            .post(&self.url)
            .query(&[("properties", self.properties.as_str())])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(text.to_string())
            .send()
            .await
            .map_err(|e| TrialGraphError::Annotation(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(TrialGraphError::Annotation(format!(
                "CoreNLP server error {}: {}",
                status, body
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| TrialGraphError::Annotation(format!("Failed to parse response: {}", e)))?;

        annotation_from_json(raw)
    }
}

/// Convert a CoreNLP JSON document into annotated sentences.
///
/// The pseudo edge from governor 0 is dropped; the sentence's dependency ROOT is
/// synthesised by the graph emitter instead. Remaining edges are ordered by
/// governor, then dependent, then relation name.
pub fn annotation_from_json(raw: Value) -> Result<Annotation> {
    let document: CoreNlpDocument = serde_json::from_value(raw.clone())
        .map_err(|e| TrialGraphError::Annotation(format!("Unexpected CoreNLP output: {}", e)))?;

    let mut sentences = Vec::with_capacity(document.sentences.len());
    for (index, sentence) in document.sentences.into_iter().enumerate() {
        let parse = sentence.parse.ok_or_else(|| {
            TrialGraphError::Annotation(format!("sentence {} has no parse tree", index))
        })?;
        let tree = ParseTree::parse_bracketed(&parse)?;

        let mut dependencies = sentence.dependencies.ok_or_else(|| {
            TrialGraphError::Annotation(format!("sentence {} has no dependencies", index))
        })?;
        dependencies.retain(|d| d.governor != 0);
        dependencies.sort_by(|a, b| {
            (a.governor, a.dependent, &a.dep).cmp(&(b.governor, b.dependent, &b.dep))
        });

        let mut tokens = sentence.tokens;
        tokens.sort_by_key(|t| t.index);

        sentences.push(AnnotatedSentence {
            tree,
            dependencies: dependencies
                .into_iter()
                .map(|d| DependencyEdge {
                    source: TokenRef::new(d.governor_gloss, d.governor),
                    target: TokenRef::new(d.dependent_gloss, d.dependent),
                    relation: d.dep,
                })
                .collect(),
            tokens: tokens
                .into_iter()
                .map(|t| Token {
                    text: t.word,
                    begin: t.begin,
                    end: t.end,
                })
                .collect(),
        });
    }

    Ok(Annotation { sentences, raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "sentences": [{
                "index": 0,
                "parse": "(ROOT (S (NP (NN age)) (VP (VBZ >) (NP (CD 18))) (. .)))",
                "enhancedPlusPlusDependencies": [
                    {"dep": "ROOT", "governor": 0, "governorGloss": "ROOT", "dependent": 2, "dependentGloss": ">"},
                    {"dep": "punct", "governor": 2, "governorGloss": ">", "dependent": 4, "dependentGloss": "."},
                    {"dep": "nsubj", "governor": 2, "governorGloss": ">", "dependent": 1, "dependentGloss": "age"},
                    {"dep": "dobj", "governor": 2, "governorGloss": ">", "dependent": 3, "dependentGloss": "18"}
                ],
                "tokens": [
                    {"index": 1, "word": "age", "characterOffsetBegin": 0, "characterOffsetEnd": 3},
                    {"index": 2, "word": ">", "characterOffsetBegin": 4, "characterOffsetEnd": 5},
                    {"index": 3, "word": "18", "characterOffsetBegin": 6, "characterOffsetEnd": 8},
                    {"index": 4, "word": ".", "characterOffsetBegin": 8, "characterOffsetEnd": 9}
                ]
            }]
        })
    }

    #[test]
    fn test_annotation_from_json() {
        let annotation = annotation_from_json(sample()).unwrap();
        assert_eq!(annotation.sentences.len(), 1);
        assert_eq!(annotation.raw, sample());

        let sentence = &annotation.sentences[0];
        assert_eq!(sentence.tree.leaf_count(), 4);
        assert_eq!(sentence.tokens[2], Token { text: "18".to_string(), begin: 6, end: 8 });

        let deps: Vec<(usize, usize, &str)> = sentence
            .dependencies
            .iter()
            .map(|d| (d.source.index, d.target.index, d.relation.as_str()))
            .collect();
        assert_eq!(deps, vec![(2, 1, "nsubj"), (2, 3, "dobj"), (2, 4, "punct")]);
        assert_eq!(sentence.dependencies[0].source.word, ">");
        assert_eq!(sentence.dependencies[0].target.word, "age");
    }

    #[test]
    fn test_missing_parse_is_annotation_error() {
        let mut raw = sample();
        raw["sentences"][0].as_object_mut().unwrap().remove("parse");
        let err = annotation_from_json(raw).unwrap_err();
        assert!(matches!(err, TrialGraphError::Annotation(_)));
        assert!(err.to_string().contains("no parse tree"));
    }

    #[test]
    fn test_missing_sentences_is_annotation_error() {
        let err = annotation_from_json(json!({"docId": "x"})).unwrap_err();
        assert!(matches!(err, TrialGraphError::Annotation(_)));
    }

    #[test]
    fn test_client_properties() {
        let client = CoreNlpClient::new(&AnnotatorConfig::default()).unwrap();
        let props: Value = serde_json::from_str(&client.properties).unwrap();
        assert_eq!(props["annotators"], "tokenize,ssplit,pos,lemma,parse");
        assert_eq!(props["ssplit.boundaryTokenRegex"], "\\.|;|\n");
        assert_eq!(props["outputFormat"], "json");
        assert_eq!(client.url, "http://localhost:9000");
    }
}
