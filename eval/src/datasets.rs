// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! FNC-1 stance/article-body dataset loading and splitting
//!
//! The store keeps the labelled headline rows alongside the article bodies
//! they reference, and derives the related/unrelated views used by two-stage
//! stance classifiers.

use crate::error::{EvalError, Result};
use crate::split::stratified_split;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Article identifier shared by the stances and bodies tables (non-negative)
pub type BodyId = u32;

/// Column headers used by the FNC-1 CSV files
pub const HEADLINE_COLUMN: &str = "Headline";
pub const BODY_ID_COLUMN: &str = "Body ID";
pub const STANCE_COLUMN: &str = "Stance";
pub const ARTICLE_BODY_COLUMN: &str = "articleBody";

/// Share of each label in the FNC-1 training set, in `Stance::ALL` order
const FNC_LABEL_SHARES: [f64; 4] = [7.36, 1.68, 17.83, 73.13];

/// Stance of an article body towards a headline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    /// The body agrees with the headline claim
    Agree,
    /// The body disputes the headline claim
    Disagree,
    /// The body discusses the claim without taking a position
    Discuss,
    /// The body is about a different topic
    Unrelated,
}

impl Stance {
    /// All labels, ordered by class index
    pub const ALL: [Stance; 4] = [
        Stance::Agree,
        Stance::Disagree,
        Stance::Discuss,
        Stance::Unrelated,
    ];

    /// Number of stance classes
    pub const COUNT: usize = Self::ALL.len();

    /// Class index used for metric tracking (agree=0 .. unrelated=3)
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Whether the body is on-topic for the headline
    pub fn is_related(self) -> bool {
        self != Stance::Unrelated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stance::Agree => "agree",
            Stance::Disagree => "disagree",
            Stance::Discuss => "discuss",
            Stance::Unrelated => "unrelated",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Stance {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        Stance::ALL
            .iter()
            .copied()
            .find(|stance| stance.as_str() == lower)
            .ok_or_else(|| EvalError::malformed("stance label", format!("unknown stance '{}'", s)))
    }
}

/// One labelled headline/body pair from the stances table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StanceRecord {
    pub headline: String,
    pub body_id: BodyId,
    pub stance: Stance,
}

/// One row of the article bodies table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleBody {
    pub body_id: BodyId,
    pub text: String,
}

/// A stance row joined with the text of the body it references
#[derive(Debug, Clone)]
pub struct HeadlineBodyPair {
    pub stance: StanceRecord,
    pub body: Arc<ArticleBody>,
}

impl HeadlineBodyPair {
    pub fn headline(&self) -> &str {
        &self.stance.headline
    }

    pub fn body_text(&self) -> &str {
        &self.body.text
    }
}

/// Article bodies keyed by body id
pub type ArticleMap = BTreeMap<BodyId, Arc<ArticleBody>>;

/// Immutable stance/article dataset with precomputed related and unrelated views
#[derive(Debug, Clone)]
pub struct StanceArticleStore {
    stances: Vec<StanceRecord>,
    articles: ArticleMap,
    related_stances: Vec<StanceRecord>,
    unrelated_stances: Vec<StanceRecord>,
    related_bodies: Vec<Arc<ArticleBody>>,
    unrelated_bodies: Vec<Arc<ArticleBody>>,
    unique_related_bodies: Vec<Arc<ArticleBody>>,
    unique_unrelated_bodies: Vec<Arc<ArticleBody>>,
    headline_bodies: Vec<HeadlineBodyPair>,
}

impl StanceArticleStore {
    /// Build a store from stance rows and a body-id keyed article table.
    ///
    /// Fails if a stance references a body id with no article, or if an
    /// article is filed under a key that differs from its own body id.
    pub fn new(
        stances: Vec<StanceRecord>,
        articles: BTreeMap<BodyId, ArticleBody>,
    ) -> Result<Self> {
        let mut shared = ArticleMap::new();
        for (key, article) in articles {
            if key != article.body_id {
                return Err(EvalError::malformed(
                    "article table",
                    format!("article with body id {} is keyed as {}", article.body_id, key),
                ));
            }
            shared.insert(key, Arc::new(article));
        }
        Self::from_shared(stances, shared)
    }

    fn from_shared(stances: Vec<StanceRecord>, articles: ArticleMap) -> Result<Self> {
        let mut headline_bodies = Vec::with_capacity(stances.len());
        for (row, stance) in stances.iter().enumerate() {
            let body = articles
                .get(&stance.body_id)
                .cloned()
                .ok_or(EvalError::MissingArticle {
                    body_id: stance.body_id,
                    row,
                })?;
            headline_bodies.push(HeadlineBodyPair {
                stance: stance.clone(),
                body,
            });
        }

        let (related, unrelated): (Vec<&HeadlineBodyPair>, Vec<&HeadlineBodyPair>) = headline_bodies
            .iter()
            .partition(|pair| pair.stance.stance.is_related());

        let related_stances = related.iter().map(|pair| pair.stance.clone()).collect();
        let unrelated_stances = unrelated.iter().map(|pair| pair.stance.clone()).collect();
        let related_bodies: Vec<_> = related.iter().map(|pair| Arc::clone(&pair.body)).collect();
        let unrelated_bodies: Vec<_> =
            unrelated.iter().map(|pair| Arc::clone(&pair.body)).collect();
        let unique_related_bodies = unique_bodies(&related_bodies);
        let unique_unrelated_bodies = unique_bodies(&unrelated_bodies);

        Ok(Self {
            stances,
            articles,
            related_stances,
            unrelated_stances,
            related_bodies,
            unrelated_bodies,
            unique_related_bodies,
            unique_unrelated_bodies,
            headline_bodies,
        })
    }

    /// Load the FNC-1 stances and bodies CSV files
    pub fn load_csv(stances_path: &Path, bodies_path: &Path) -> Result<Self> {
        let stances_file = File::open(stances_path).map_err(|e| {
            EvalError::io(format!("failed to open stances file {}", stances_path.display()), e)
        })?;
        let bodies_file = File::open(bodies_path).map_err(|e| {
            EvalError::io(format!("failed to open bodies file {}", bodies_path.display()), e)
        })?;

        let stances = read_stances(stances_file, &stances_path.display().to_string())?;
        let articles = read_articles(bodies_file, &bodies_path.display().to_string())?;

        tracing::info!(
            "Loaded {} stances and {} bodies from {} / {}",
            stances.len(),
            articles.len(),
            stances_path.display(),
            bodies_path.display()
        );

        Self::from_shared(stances, articles)
    }

    /// Parse stances and bodies CSV content from arbitrary readers
    pub fn from_csv_readers<S: Read, B: Read>(stances: S, bodies: B) -> Result<Self> {
        let stances = read_stances(stances, "stances table")?;
        let articles = read_articles(bodies, "bodies table")?;
        Self::from_shared(stances, articles)
    }

    /// Write the store in the layout `from_csv_readers` reads
    pub fn write_csv<S: Write, B: Write>(&self, stances: S, bodies: B) -> Result<()> {
        let mut writer = csv::Writer::from_writer(stances);
        writer.write_record([HEADLINE_COLUMN, BODY_ID_COLUMN, STANCE_COLUMN])?;
        for record in &self.stances {
            writer.write_record([
                record.headline.as_str(),
                record.body_id.to_string().as_str(),
                record.stance.as_str(),
            ])?;
        }
        writer
            .flush()
            .map_err(|e| EvalError::io("failed to flush stances CSV", e))?;

        let mut writer = csv::Writer::from_writer(bodies);
        writer.write_record([BODY_ID_COLUMN, ARTICLE_BODY_COLUMN])?;
        for article in self.articles.values() {
            writer.write_record([article.body_id.to_string().as_str(), article.text.as_str()])?;
        }
        writer
            .flush()
            .map_err(|e| EvalError::io("failed to flush bodies CSV", e))?;

        Ok(())
    }

    /// Write the store to a pair of CSV files
    pub fn save_csv(&self, stances_path: &Path, bodies_path: &Path) -> Result<()> {
        let stances = File::create(stances_path).map_err(|e| {
            EvalError::io(format!("failed to create {}", stances_path.display()), e)
        })?;
        let bodies = File::create(bodies_path).map_err(|e| {
            EvalError::io(format!("failed to create {}", bodies_path.display()), e)
        })?;
        self.write_csv(stances, bodies)
    }

    /// Stratified train/test split on the stance label.
    ///
    /// Each returned store carries only the article bodies its own stances
    /// reference. With a seed the partition is reproducible.
    pub fn split(&self, test_fraction: f64, seed: Option<u64>) -> Result<(Self, Self)> {
        let keys: Vec<Stance> = self.stances.iter().map(|record| record.stance).collect();
        let partition = stratified_split(&keys, test_fraction, seed)?;

        let train = self.subset(&partition.train)?;
        let test = self.subset(&partition.test)?;

        tracing::info!(
            "Split {} stances into train={} ({} bodies) and test={} ({} bodies)",
            self.len(),
            train.len(),
            train.articles.len(),
            test.len(),
            test.articles.len()
        );

        Ok((train, test))
    }

    fn subset(&self, rows: &[usize]) -> Result<Self> {
        let stances: Vec<StanceRecord> = rows
            .iter()
            .filter_map(|&row| self.stances.get(row).cloned())
            .collect();

        let mut articles = ArticleMap::new();
        for (row, record) in stances.iter().enumerate() {
            if articles.contains_key(&record.body_id) {
                continue;
            }
            let body = self.articles.get(&record.body_id).ok_or(EvalError::MissingArticle {
                body_id: record.body_id,
                row,
            })?;
            articles.insert(record.body_id, Arc::clone(body));
        }

        Self::from_shared(stances, articles)
    }

    /// Generate a reproducible in-memory dataset with an FNC-like label skew.
    ///
    /// When `num_stances >= 8` every label is guaranteed at least two rows so
    /// the result can always be split.
    pub fn synthetic(num_bodies: usize, num_stances: usize, seed: u64) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let num_bodies = num_bodies.max(1);

        let topics = [
            "a spider burrowed under a tourist's skin",
            "a city banned plastic bags",
            "a celebrity announced a surprise retirement",
            "a new species of frog was discovered",
            "a tech company recalled its latest phone",
            "a meteor was seen over the coast",
        ];

        let articles: ArticleMap = (0..num_bodies)
            .map(|i| {
                let body_id = i as BodyId;
                let topic = topics[i % topics.len()];
                let text = format!(
                    "Reports claim that {}. Officials have commented on story {}.",
                    topic, i
                );
                (body_id, Arc::new(ArticleBody { body_id, text }))
            })
            .collect();

        let total_share: f64 = FNC_LABEL_SHARES.iter().sum();
        let stances = (0..num_stances)
            .map(|i| {
                let stance = if num_stances >= 2 * Stance::COUNT && i < 2 * Stance::COUNT {
                    Stance::ALL[i % Stance::COUNT]
                } else {
                    let mut draw = rng.gen_range(0.0..total_share);
                    let mut chosen = Stance::Unrelated;
                    for (stance, share) in Stance::ALL.iter().zip(FNC_LABEL_SHARES) {
                        if draw < share {
                            chosen = *stance;
                            break;
                        }
                        draw -= share;
                    }
                    chosen
                };

                let body_idx = rng.gen_range(0..num_bodies);
                let topic_idx = if stance.is_related() {
                    body_idx % topics.len()
                } else {
                    (body_idx + 1 + rng.gen_range(0..topics.len() - 1)) % topics.len()
                };

                StanceRecord {
                    headline: format!("Headline {}: {}", i, topics[topic_idx]),
                    body_id: body_idx as BodyId,
                    stance,
                }
            })
            .collect();

        Self::from_shared(stances, articles)
    }

    pub fn len(&self) -> usize {
        self.stances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stances.is_empty()
    }

    pub fn stances(&self) -> &[StanceRecord] {
        &self.stances
    }

    pub fn articles(&self) -> &ArticleMap {
        &self.articles
    }

    pub fn article(&self, body_id: BodyId) -> Option<&ArticleBody> {
        self.articles.get(&body_id).map(Arc::as_ref)
    }

    /// Stances whose label is not `unrelated`
    pub fn related_stances(&self) -> &[StanceRecord] {
        &self.related_stances
    }

    pub fn unrelated_stances(&self) -> &[StanceRecord] {
        &self.unrelated_stances
    }

    /// Bodies aligned row-for-row with `related_stances`
    pub fn related_bodies(&self) -> &[Arc<ArticleBody>] {
        &self.related_bodies
    }

    /// Bodies aligned row-for-row with `unrelated_stances`
    pub fn unrelated_bodies(&self) -> &[Arc<ArticleBody>] {
        &self.unrelated_bodies
    }

    /// Distinct bodies referenced by related stances, in first-seen order
    pub fn unique_related_bodies(&self) -> &[Arc<ArticleBody>] {
        &self.unique_related_bodies
    }

    pub fn unique_unrelated_bodies(&self) -> &[Arc<ArticleBody>] {
        &self.unique_unrelated_bodies
    }

    /// Every stance row joined with its body text, in stance order
    pub fn headline_bodies(&self) -> &[HeadlineBodyPair] {
        &self.headline_bodies
    }

    /// Class index of every stance row, for feeding metric accumulators
    pub fn label_indices(&self) -> Vec<usize> {
        self.stances.iter().map(|record| record.stance.index()).collect()
    }

    /// Number of stance rows per label
    pub fn label_distribution(&self) -> BTreeMap<Stance, usize> {
        let mut dist = BTreeMap::new();
        for record in &self.stances {
            *dist.entry(record.stance).or_insert(0) += 1;
        }
        dist
    }
}

fn unique_bodies(bodies: &[Arc<ArticleBody>]) -> Vec<Arc<ArticleBody>> {
    let mut seen = HashSet::new();
    bodies
        .iter()
        .filter(|body| seen.insert(body.body_id))
        .cloned()
        .collect()
}

fn column_index(headers: &csv::StringRecord, name: &str, origin: &str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header.trim_start_matches('\u{feff}').trim() == name)
        .ok_or_else(|| EvalError::malformed(origin, format!("missing required column '{}'", name)))
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    origin: &str,
    row: usize,
) -> Result<&'r str> {
    record.get(idx).ok_or_else(|| {
        EvalError::malformed(origin, format!("row {} is missing field {}", row, idx))
    })
}

/// Coerce a Body ID cell to a non-negative integer; integral floats such as
/// `12.0` are accepted, negative IDs are rejected
fn parse_body_id(raw: &str, origin: &str, row: usize) -> Result<BodyId> {
    let trimmed = raw.trim();
    if let Ok(id) = trimmed.parse::<BodyId>() {
        return Ok(id);
    }
    match trimmed.parse::<f64>() {
        Ok(value)
            if value.is_finite()
                && value.fract() == 0.0
                && value >= 0.0
                && value <= BodyId::MAX as f64 =>
        {
            Ok(value as BodyId)
        }
        _ => Err(EvalError::malformed(
            origin,
            format!("row {}: Body ID '{}' is not an integer", row, raw),
        )),
    }
}

fn read_stances<R: Read>(source: R, origin: &str) -> Result<Vec<StanceRecord>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(source);
    let headers = reader.headers()?.clone();
    let headline_idx = column_index(&headers, HEADLINE_COLUMN, origin)?;
    let body_id_idx = column_index(&headers, BODY_ID_COLUMN, origin)?;
    let stance_idx = column_index(&headers, STANCE_COLUMN, origin)?;

    let mut stances = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = idx + 1;
        let record =
            result.map_err(|e| EvalError::malformed(origin, format!("row {}: {}", row, e)))?;

        let headline = field(&record, headline_idx, origin, row)?.to_string();
        let body_id = parse_body_id(field(&record, body_id_idx, origin, row)?, origin, row)?;
        let raw_stance = field(&record, stance_idx, origin, row)?;
        let stance = raw_stance.parse::<Stance>().map_err(|_| {
            EvalError::malformed(origin, format!("row {}: unknown stance '{}'", row, raw_stance))
        })?;

        stances.push(StanceRecord {
            headline,
            body_id,
            stance,
        });
    }

    tracing::debug!("Parsed {} stance rows from {}", stances.len(), origin);
    Ok(stances)
}

fn read_articles<R: Read>(source: R, origin: &str) -> Result<ArticleMap> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(source);
    let headers = reader.headers()?.clone();
    let body_id_idx = column_index(&headers, BODY_ID_COLUMN, origin)?;
    let text_idx = column_index(&headers, ARTICLE_BODY_COLUMN, origin)?;

    let mut articles = ArticleMap::new();
    for (idx, result) in reader.records().enumerate() {
        let row = idx + 1;
        let record =
            result.map_err(|e| EvalError::malformed(origin, format!("row {}: {}", row, e)))?;

        let body_id = parse_body_id(field(&record, body_id_idx, origin, row)?, origin, row)?;
        let text = field(&record, text_idx, origin, row)?.to_string();

        if articles
            .insert(body_id, Arc::new(ArticleBody { body_id, text }))
            .is_some()
        {
            return Err(EvalError::malformed(
                origin,
                format!("row {}: duplicate Body ID {}", row, body_id),
            ));
        }
    }

    tracing::debug!("Parsed {} article bodies from {}", articles.len(), origin);
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(body_id: BodyId, text: &str) -> ArticleBody {
        ArticleBody {
            body_id,
            text: text.to_string(),
        }
    }

    fn record(headline: &str, body_id: BodyId, stance: Stance) -> StanceRecord {
        StanceRecord {
            headline: headline.to_string(),
            body_id,
            stance,
        }
    }

    fn small_store() -> StanceArticleStore {
        let articles = [body(1, "first body"), body(2, "second body"), body(3, "third body")]
            .into_iter()
            .map(|b| (b.body_id, b))
            .collect();
        let stances = vec![
            record("h1", 1, Stance::Agree),
            record("h2", 1, Stance::Unrelated),
            record("h3", 2, Stance::Discuss),
            record("h4", 1, Stance::Disagree),
            record("h5", 3, Stance::Unrelated),
            record("h6", 3, Stance::Unrelated),
        ];
        StanceArticleStore::new(stances, articles).unwrap()
    }

    /// 40 rows over 5 bodies: 20 unrelated, 10 discuss, 6 agree, 4 disagree
    fn split_store() -> StanceArticleStore {
        let articles = (0..5)
            .map(|id| (id, body(id, &format!("body {}", id))))
            .collect();
        let plan = [
            (Stance::Unrelated, 20),
            (Stance::Discuss, 10),
            (Stance::Agree, 6),
            (Stance::Disagree, 4),
        ];
        let mut stances = Vec::new();
        for (stance, count) in plan {
            for i in 0..count {
                stances.push(record(&format!("{} {}", stance, i), (i % 5) as BodyId, stance));
            }
        }
        StanceArticleStore::new(stances, articles).unwrap()
    }

    fn load(stances: &str, bodies: &str) -> Result<StanceArticleStore> {
        StanceArticleStore::from_csv_readers(stances.as_bytes(), bodies.as_bytes())
    }

    fn ids(bodies: &[Arc<ArticleBody>]) -> Vec<BodyId> {
        bodies.iter().map(|b| b.body_id).collect()
    }

    fn sorted(records: &[StanceRecord]) -> Vec<StanceRecord> {
        let mut records = records.to_vec();
        records.sort();
        records
    }

    #[test]
    fn test_stance_parsing() {
        assert_eq!("agree".parse::<Stance>().unwrap(), Stance::Agree);
        assert_eq!(" Unrelated ".parse::<Stance>().unwrap(), Stance::Unrelated);
        assert!("neutral".parse::<Stance>().is_err());
        assert_eq!(Stance::from_index(2), Some(Stance::Discuss));
        assert_eq!(Stance::from_index(4), None);
        assert_eq!(Stance::Unrelated.index(), 3);
    }

    #[test]
    fn test_related_unrelated_partition() {
        let store = small_store();

        assert_eq!(store.related_stances().len(), 3);
        assert_eq!(store.unrelated_stances().len(), 3);
        assert!(store.related_stances().iter().all(|r| r.stance.is_related()));
        assert!(store.unrelated_stances().iter().all(|r| r.stance == Stance::Unrelated));

        let mut union = store.related_stances().to_vec();
        union.extend_from_slice(store.unrelated_stances());
        assert_eq!(sorted(&union), sorted(store.stances()));
    }

    #[test]
    fn test_bodies_align_with_stances() {
        let store = small_store();

        let related_ids = ids(store.related_bodies());
        assert_eq!(related_ids, vec![1, 2, 1]);
        let unrelated_ids = ids(store.unrelated_bodies());
        assert_eq!(unrelated_ids, vec![1, 3, 3]);

        for (stance, body) in store.related_stances().iter().zip(store.related_bodies()) {
            assert_eq!(stance.body_id, body.body_id);
        }
    }

    #[test]
    fn test_unique_bodies_are_deduplicated() {
        let store = small_store();

        let unique_related = ids(store.unique_related_bodies());
        assert_eq!(unique_related, vec![1, 2]);
        let unique_unrelated = ids(store.unique_unrelated_bodies());
        assert_eq!(unique_unrelated, vec![1, 3]);
    }

    #[test]
    fn test_headline_bodies_join() {
        let store = small_store();
        let joined = store.headline_bodies();

        assert_eq!(joined.len(), store.len());
        assert_eq!(joined[0].headline(), "h1");
        assert_eq!(joined[0].body_text(), "first body");
        assert_eq!(joined[2].body_text(), "second body");
        assert_eq!(joined[5].body_text(), "third body");
    }

    #[test]
    fn test_missing_article_is_lookup_failure() {
        let articles = [body(1, "only body")].into_iter().map(|b| (b.body_id, b)).collect();
        let stances = vec![record("h1", 1, Stance::Agree), record("h2", 9, Stance::Discuss)];

        let err = StanceArticleStore::new(stances, articles).unwrap_err();
        assert!(matches!(err, EvalError::MissingArticle { body_id: 9, row: 1 }));
    }

    #[test]
    fn test_mismatched_article_key_rejected() {
        let articles = [(5, body(6, "misfiled"))].into_iter().collect();
        let err = StanceArticleStore::new(vec![], articles).unwrap_err();
        assert!(matches!(err, EvalError::MalformedInput { .. }));
    }

    #[test]
    fn test_load_from_csv_readers() {
        let stances = "Headline,Body ID,Stance\n\
                       \"Police find mass graves\",712,unrelated\n\
                       Hundreds of Palestinians flee,158,agree\n\
                       Spider burrowed through tourist's stomach,158.0,discuss\n";
        let bodies = "Body ID,articleBody\n\
                      158,\"A body with a comma, and\na newline\"\n\
                      712,Another body\n";

        let store = load(stances, bodies).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.stances()[0].headline, "Police find mass graves");
        assert_eq!(store.stances()[2].body_id, 158);
        assert_eq!(store.article(158).unwrap().text, "A body with a comma, and\na newline");
        assert_eq!(store.unique_related_bodies().len(), 1);
    }

    #[test]
    fn test_load_accepts_reordered_columns_and_bom() {
        let stances = "\u{feff}Stance,Headline,Body ID,Extra\nagree,h,1,x\n";
        let bodies = "articleBody,Body ID\ntext,1\n";

        let store = load(stances, bodies).unwrap();
        assert_eq!(store.stances()[0], record("h", 1, Stance::Agree));
    }

    #[test]
    fn test_load_rejects_missing_column() {
        let stances = "Headline,Stance\nh,agree\n";
        let bodies = "Body ID,articleBody\n1,text\n";

        let err = load(stances, bodies).unwrap_err();
        match err {
            EvalError::MalformedInput { reason, .. } => assert!(reason.contains("Body ID")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_rejects_bad_body_id() {
        let bodies = "Body ID,articleBody\n1,text\n";
        for bad in ["abc", "1.5", "-2"] {
            let stances = format!("Headline,Body ID,Stance\nh,{},agree\n", bad);
            let err = load(&stances, bodies).unwrap_err();
            assert!(matches!(err, EvalError::MalformedInput { .. }), "accepted {bad}");
        }
    }

    #[test]
    fn test_load_rejects_duplicate_body_id() {
        let stances = "Headline,Body ID,Stance\nh,1,agree\n";
        let bodies = "Body ID,articleBody\n1,first\n1,second\n";

        let err = load(stances, bodies).unwrap_err();
        match err {
            EvalError::MalformedInput { reason, .. } => assert!(reason.contains("duplicate")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_rejects_unknown_stance() {
        let stances = "Headline,Body ID,Stance\nh,1,maybe\n";
        let bodies = "Body ID,articleBody\n1,text\n";

        let err = load(stances, bodies).unwrap_err();
        assert!(matches!(err, EvalError::MalformedInput { .. }));
    }

    #[test]
    fn test_load_reports_unreferenced_lookup_failure() {
        let stances = "Headline,Body ID,Stance\nh,2,agree\n";
        let bodies = "Body ID,articleBody\n1,text\n";

        let err = load(stances, bodies).unwrap_err();
        assert!(matches!(err, EvalError::MissingArticle { body_id: 2, .. }));
    }

    #[test]
    fn test_csv_round_trip_through_files() {
        let store = small_store();
        let dir = tempfile::tempdir().unwrap();
        let stances_path = dir.path().join("stances.csv");
        let bodies_path = dir.path().join("bodies.csv");

        store.save_csv(&stances_path, &bodies_path).unwrap();
        let reloaded = StanceArticleStore::load_csv(&stances_path, &bodies_path).unwrap();

        assert_eq!(reloaded.stances(), store.stances());
        assert_eq!(reloaded.articles().len(), store.articles().len());
        assert_eq!(reloaded.article(2).unwrap().text, "second body");
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let store = split_store();
        let (train, test) = store.split(0.25, Some(42)).unwrap();

        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 30);

        let mut union = train.stances().to_vec();
        union.extend_from_slice(test.stances());
        assert_eq!(sorted(&union), sorted(store.stances()));
    }

    #[test]
    fn test_split_preserves_label_distribution() {
        let store = split_store();
        let (train, test) = store.split(0.25, Some(3)).unwrap();

        let test_dist = test.label_distribution();
        assert_eq!(test_dist[&Stance::Unrelated], 5);
        assert_eq!(test_dist[&Stance::Discuss], 3);
        assert_eq!(test_dist[&Stance::Agree], 1);
        assert_eq!(test_dist[&Stance::Disagree], 1);

        let original = store.label_distribution();
        for (stance, count) in train.label_distribution() {
            assert_eq!(count + test_dist[&stance], original[&stance]);
        }
    }

    #[test]
    fn test_split_is_deterministic_with_seed() {
        let store = split_store();
        let (train_a, test_a) = store.split(0.3, Some(11)).unwrap();
        let (train_b, test_b) = store.split(0.3, Some(11)).unwrap();

        assert_eq!(train_a.stances(), train_b.stances());
        assert_eq!(test_a.stances(), test_b.stances());
    }

    #[test]
    fn test_split_selects_referenced_bodies_only() {
        let store = split_store();
        let (train, test) = store.split(0.25, Some(5)).unwrap();

        for part in [&train, &test] {
            let referenced: HashSet<BodyId> =
                part.stances().iter().map(|r| r.body_id).collect();
            let held: HashSet<BodyId> = part.articles().keys().copied().collect();
            assert_eq!(referenced, held);
        }
    }

    #[test]
    fn test_split_errors() {
        let store = split_store();
        assert!(matches!(store.split(0.0, None), Err(EvalError::InvalidArgument(_))));
        assert!(matches!(store.split(1.0, None), Err(EvalError::InvalidArgument(_))));

        let degenerate = small_store();
        assert!(matches!(degenerate.split(0.5, Some(1)), Err(EvalError::DegenerateSplit(_))));
    }

    #[test]
    fn test_synthetic_store() {
        let store = StanceArticleStore::synthetic(20, 200, 42).unwrap();
        let again = StanceArticleStore::synthetic(20, 200, 42).unwrap();

        assert_eq!(store.len(), 200);
        assert_eq!(store.articles().len(), 20);
        assert_eq!(store.stances(), again.stances());
        assert!(store.label_distribution().values().all(|&count| count >= 2));

        let dist = store.label_distribution();
        assert!(dist[&Stance::Unrelated] > dist[&Stance::Discuss]);
        assert!(store.split(0.2, Some(1)).is_ok());
    }
}
