//! Product reviews → `dim_reviewer` and `fact_reviews` with a sentiment score.

use super::{Job, JobKind, TransformContext};
use crate::coerce::{self, CoercionPlan};
use crate::dimension::{self, DedupOrder, DimensionSpec, SurrogateKey};
use crate::error::Result;
use crate::fact;
use crate::load::{LoadMode, TableLoad};
use crate::normalize;
use crate::sentiment;
use crate::types::{Frame, TableSchema, Value};

pub const DIM_REVIEWER: &str = "dim_reviewer";
pub const FACT_REVIEWS: &str = "fact_reviews";

const SOURCE_COLUMNS: [&str; 4] = ["UserId", "Score", "Time", "Summary"];

const MAPPING: [(&str, &str); 4] = [
    ("UserId", "reviewer_id"),
    ("Score", "score"),
    ("Time", "time"),
    ("Summary", "summary"),
];

const FACT_COLUMNS: [&str; 5] = ["reviewer_id", "score", "time", "summary", "sentiment_score"];

const PLAN: CoercionPlan<'static> = CoercionPlan {
    integer: &["score"],
    decimal: &[],
    text: &["reviewer_id", "time", "summary"],
    scale: &[],
    boolean: &[],
    required: &["reviewer_id", "score", "summary"],
};

pub struct ReviewsJob;

impl Job for ReviewsJob {
    fn kind(&self) -> JobKind {
        JobKind::Reviews
    }

    fn default_input(&self) -> &'static str {
        "source_data/Reviews.csv"
    }

    fn default_encoding(&self) -> &'static str {
        "latin1"
    }

    fn tables(&self) -> Vec<TableSchema> {
        vec![
            TableSchema::new(DIM_REVIEWER).key("reviewer_id", "VARCHAR(50)"),
            TableSchema::new(FACT_REVIEWS)
                .column("reviewer_id", "VARCHAR(50)")
                .column("score", "INTEGER")
                .column("time", "VARCHAR(50)")
                .column("summary", "TEXT")
                .column("sentiment_score", "FLOAT")
                .references("reviewer_id", DIM_REVIEWER, "reviewer_id"),
        ]
    }

    fn transform(&self, source: Frame, ctx: &TransformContext) -> Result<Vec<TableLoad>> {
        let reviews = source.select(&SOURCE_COLUMNS)?.distinct();
        let reviews = normalize::rename_columns(reviews, &MAPPING, ctx.mapping_policy)?;
        let reviews = coerce::apply(reviews, &PLAN)?;
        let mut reviews = fact::prefix_values(reviews, "reviewer_id", "REV_")?;

        let scores: Vec<Value> = reviews
            .column_values("summary")?
            .into_iter()
            .map(|v| v.as_str().map_or(Value::Null, |s| Value::Float(sentiment::polarity(s))))
            .collect();
        reviews.push_column("sentiment_score", scores)?;
        let reviews = fact::select_columns(&reviews, &FACT_COLUMNS)?;

        let reviewers = dimension::build_dimension(
            &reviews,
            &DimensionSpec {
                name: DIM_REVIEWER,
                natural_key: &["reviewer_id"],
                attributes: &[],
                order: DedupOrder::sorted(),
                surrogate: SurrogateKey::Natural,
            },
        )?;

        Ok(vec![
            TableLoad::new(
                DIM_REVIEWER,
                normalize::reconcile(&reviewers, ctx.schema(DIM_REVIEWER)?),
                LoadMode::TruncateAppend,
            ),
            TableLoad::new(
                FACT_REVIEWS,
                normalize::reconcile(&reviews, ctx.schema(FACT_REVIEWS)?),
                LoadMode::TruncateAppend,
            ),
        ])
    }
}
