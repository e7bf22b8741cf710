//! FTS5 full-text storage and BM25 ranking for articles.
//!
//! # Column Weights (BM25)
//!
//! | Column  | Weight |
//! |---------|--------|
//! | title   | 2.0    |
//! | clauses | 1.0    |
//! | chapter | 1.0    |
//! | part    | 1.0    |
//!
//! # Tokenizer
//!
//! Porter stemmer over `unicode61`, so "arrested" matches "arrest" and
//! accented letters fold to their base form.

use anyhow::{Context, Result};
use katiba_core::article::Article;
use rusqlite::{Connection, Row, params};

pub const BM25_WEIGHT_TITLE: f64 = 2.0;
pub const BM25_WEIGHT_CLAUSES: f64 = 1.0;
pub const BM25_WEIGHT_CHAPTER: f64 = 1.0;
pub const BM25_WEIGHT_PART: f64 = 1.0;

const SCHEMA: &str = "
CREATE TABLE articles (
    number  INTEGER PRIMARY KEY,
    title   TEXT NOT NULL,
    clauses TEXT NOT NULL,
    chapter TEXT NOT NULL,
    part    TEXT
);

CREATE VIRTUAL TABLE articles_fts USING fts5(
    title,
    clauses,
    chapter,
    part,
    content='articles',
    content_rowid='number',
    tokenize='porter unicode61'
);
";

/// Create the article tables and load `articles` into them.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn create_and_populate(conn: &Connection, articles: &[Article]) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("create lexical index tables")?;

    let mut insert = conn
        .prepare(
            "INSERT INTO articles (number, title, clauses, chapter, part)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .context("prepare article insert")?;
    for article in articles {
        insert
            .execute(params![
                article.number,
                article.title,
                article.clauses,
                article.chapter,
                article.part,
            ])
            .with_context(|| format!("insert article {}", article.number))?;
    }

    conn.execute("INSERT INTO articles_fts(articles_fts) VALUES('rebuild')", [])
        .context("populate FTS5 index from articles table")?;
    Ok(())
}

/// Articles matching the FTS5 `expression`, best first, at most `limit`.
///
/// Lower `bm25()` is a better match; ties fall back to article number.
///
/// # Errors
///
/// Returns the underlying [`rusqlite::Error`] (wrapped) if the expression is
/// malformed or the tables are missing.
pub fn search_bm25(conn: &Connection, expression: &str, limit: usize) -> Result<Vec<Article>> {
    let sql = "SELECT a.number, a.title, a.clauses, a.chapter, a.part, \
                      bm25(articles_fts, ?1, ?2, ?3, ?4) AS rank \
               FROM articles_fts \
               INNER JOIN articles a ON a.number = articles_fts.rowid \
               WHERE articles_fts MATCH ?5 \
               ORDER BY rank, a.number \
               LIMIT ?6";

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn
        .prepare_cached(sql)
        .context("prepare FTS5 BM25 search query")?;

    let rows = stmt
        .query_map(
            params![
                BM25_WEIGHT_TITLE,
                BM25_WEIGHT_CLAUSES,
                BM25_WEIGHT_CHAPTER,
                BM25_WEIGHT_PART,
                expression,
                limit,
            ],
            article_from_row,
        )
        .with_context(|| format!("execute FTS5 search for '{expression}'"))?;

    let mut hits = Vec::new();
    for row in rows {
        hits.push(row.context("read FTS5 search hit")?);
    }
    Ok(hits)
}

/// Number of rows visible through the FTS5 table.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn fts_row_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM articles_fts", [], |row| row.get(0))
        .context("count FTS5 rows")?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        number: row.get(0)?,
        title: row.get(1)?,
        clauses: row.get(2)?,
        chapter: row.get(3)?,
        part: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(number: u32, title: &str, clauses: &str, part: Option<&str>) -> Article {
        Article::new(
            title,
            clauses,
            "Chapter Four - The Bill of Rights",
            number,
            part.map(str::to_string),
        )
    }

    fn test_db(articles: &[Article]) -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        create_and_populate(&conn, articles).expect("populate");
        conn
    }

    fn numbers(hits: &[Article]) -> Vec<u32> {
        hits.iter().map(|a| a.number).collect()
    }

    #[test]
    fn populate_indexes_every_article() {
        let conn = test_db(&[
            article(49, "Rights of arrested persons", "An arrested person has the right", None),
            article(50, "Fair hearing", "Every person has the right to a fair trial", None),
        ]);
        assert_eq!(fts_row_count(&conn).expect("count"), 2);
    }

    #[test]
    fn stemming_matches_inflections() {
        let conn = test_db(&[
            article(49, "Rights of arrested persons", "to be informed promptly", None),
            article(27, "Equality", "Every person is equal before the law", None),
        ]);
        let hits = search_bm25(&conn, "\"arrest\"", 10).expect("search");
        assert_eq!(numbers(&hits), vec![49]);
    }

    #[test]
    fn title_matches_outrank_body_matches() {
        let conn = test_db(&[
            article(10, "General provisions", "Land shall be held equitably", None),
            article(60, "Land", "Principles of land policy", None),
        ]);
        let hits = search_bm25(&conn, "\"land\"", 10).expect("search");
        assert_eq!(numbers(&hits), vec![60, 10]);
    }

    #[test]
    fn part_column_round_trips_and_is_searchable() {
        let conn = test_db(&[
            article(
                62,
                "Public land",
                "Public land is land which vests in government",
                Some("Part 2 - Classification of land"),
            ),
            article(1, "Sovereignty of the people", "All sovereign power", None),
        ]);
        let hits = search_bm25(&conn, "\"classification\"", 10).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].part.as_deref(), Some("Part 2 - Classification of land"));

        let hits = search_bm25(&conn, "\"sovereign\"", 10).expect("search");
        assert_eq!(hits[0].part, None);
    }

    #[test]
    fn limit_caps_results() {
        let conn = test_db(&[
            article(1, "Person", "a person", None),
            article(2, "Person", "a person", None),
            article(3, "Person", "a person", None),
        ]);
        let hits = search_bm25(&conn, "\"person\"", 2).expect("search");
        assert_eq!(numbers(&hits), vec![1, 2]);
        assert!(search_bm25(&conn, "\"person\"", 0).expect("search").is_empty());
    }

    #[test]
    fn malformed_expression_is_an_sqlite_error() {
        let conn = test_db(&[article(1, "Person", "a person", None)]);
        let err = search_bm25(&conn, "\"unterminated", 5).expect_err("must fail");
        assert!(err.downcast_ref::<rusqlite::Error>().is_some());
    }
}
