use std::collections::HashSet;

use ragloop_core::{Evaluation, QueryResult};

/// 理想检索条数，召回率的分母
const IDEAL_SOURCE_COUNT: f32 = 5.0;

const FAITHFULNESS_WEIGHT: f32 = 0.3;
const RELEVANCE_WEIGHT: f32 = 0.3;
const PRECISION_WEIGHT: f32 = 0.2;
const RECALL_WEIGHT: f32 = 0.2;

/// 启发式自评估器
///
/// 用词重叠近似 RAG 三元组指标，不发起任何外部调用。
/// 空查询、空回答、空检索集都有确定的零值结果，永不失败。
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

impl Evaluator {
    /// 对一次查询结果打分，所有输出都在 [0, 1]
    pub fn evaluate(&self, query: &str, result: &QueryResult) -> Evaluation {
        let answer_tokens = token_set(&result.answer);

        // 没有可比对的来源文本时，忠实度直接记零
        let faithfulness = if result.sources.is_empty() {
            0.0
        } else {
            let source_tokens: HashSet<String> = result
                .sources
                .iter()
                .flat_map(|source| token_set(&source.text))
                .collect();
            let overlap = answer_tokens.intersection(&source_tokens).count() as f32;
            (overlap / answer_tokens.len().max(1) as f32).min(1.0)
        };

        let context_precision = if result.sources.is_empty() {
            0.0
        } else {
            result.sources.iter().map(|source| source.score).sum::<f32>()
                / result.sources.len() as f32
        };

        let context_recall = (result.sources.len() as f32 / IDEAL_SOURCE_COUNT).min(1.0);

        let query_tokens = token_set(query);
        let answer_relevance = query_tokens.intersection(&answer_tokens).count() as f32
            / query_tokens.len().max(1) as f32;

        let overall_score = FAITHFULNESS_WEIGHT * faithfulness
            + RELEVANCE_WEIGHT * answer_relevance
            + PRECISION_WEIGHT * context_precision
            + RECALL_WEIGHT * context_recall;

        Evaluation {
            faithfulness,
            context_precision,
            context_recall,
            answer_relevance,
            overall_score,
        }
    }
}
