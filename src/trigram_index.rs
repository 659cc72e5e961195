//! Stage-1 candidate generation over entry names.
//!
//! Every indexed name of every version lives in one in-RAM tantivy index,
//! tokenized into lowercase character trigrams. A query is cut into the same
//! trigrams and OR'ed together, filtered to one version, and BM25 orders the
//! hits; shorter names sharing more trigrams with the query float up.

use std::collections::BTreeSet;

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{
        FAST,
        Field,
        INDEXED,
        IndexRecordOption,
        STORED,
        Schema,
        TextFieldIndexing,
        TextOptions,
        Value,
    },
    tokenizer::{LowerCaser, NgramTokenizer, TextAnalyzer, TokenStream},
};

use crate::{entry::DocVersion, error::Result};

/// Number of candidates stage 1 hands to the reranker.
pub const STAGE1_LIMIT: usize = 8;

const TRIGRAM: &str = "trigram";

/// Single-threaded writer budget; names are short and few.
const WRITER_MEMORY: usize = 15_000_000;

/// Field names used in the schema.
pub mod fields {
    pub const NAME: &str = "name";
    pub const VERSION: &str = "v";
}

#[derive(Clone, Copy)]
struct SchemaFields {
    name: Field,
    version: Field,
}

pub struct TrigramIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let name_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TRIGRAM)
                .set_index_option(IndexRecordOption::WithFreqs),
        )
        .set_stored();
    let name = builder.add_text_field(fields::NAME, name_opts);
    let version =
        builder.add_u64_field(fields::VERSION, INDEXED | STORED | FAST);

    (builder.build(), SchemaFields { name, version })
}

fn register_tokenizers(index: &Index) -> Result<()> {
    let trigram = TextAnalyzer::builder(NgramTokenizer::new(3, 3, false)?)
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TRIGRAM, trigram);
    Ok(())
}

impl TrigramIndex {
    /// Index the given per-version name lists.
    pub fn build<'a>(
        versions: impl IntoIterator<Item = (DocVersion, &'a [String])>,
    ) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index)?;

        let mut writer: IndexWriter =
            index.writer_with_num_threads(1, WRITER_MEMORY)?;
        for (v, names) in versions {
            for name in names {
                writer.add_document(doc!(
                    fields.name => name.as_str(),
                    fields.version => u64::from(v),
                ))?;
            }
        }
        writer.commit()?;

        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// An index with no names at all.
    pub fn empty() -> Result<Self> {
        Self::build(std::iter::empty())
    }

    fn trigrams(&self, text: &str) -> Result<BTreeSet<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.name)?;
        let mut stream = analyzer.token_stream(text);
        let mut grams = BTreeSet::new();
        stream.process(&mut |token| {
            grams.insert(token.text.clone());
        });
        Ok(grams)
    }

    /// Up to `limit` names of version `v` sharing trigrams with `query`,
    /// best first.
    ///
    /// Queries with no trigram (fewer than three characters) return nothing.
    pub fn candidates(
        &self,
        query: &str,
        v: DocVersion,
        limit: usize,
    ) -> Result<Vec<String>> {
        let grams = self.trigrams(query)?;
        if grams.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let should: Vec<(Occur, Box<dyn Query>)> = grams
            .iter()
            .map(|gram| {
                let term = Term::from_field_text(self.fields.name, gram);
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    term,
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, query)
            })
            .collect();
        let version_query = TermQuery::new(
            Term::from_field_u64(self.fields.version, u64::from(v)),
            IndexRecordOption::Basic,
        );
        let query = BooleanQuery::new(vec![
            (Occur::Must, Box::new(BooleanQuery::new(should))),
            (Occur::Must, Box::new(version_query)),
        ]);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut names = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(name) =
                doc.get_first(self.fields.name).and_then(|v| v.as_str())
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Number of indexed names across all versions.
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TrigramIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrigramIndex").finish_non_exhaustive()
    }
}
