use anyhow::{Context, Result};
use deadpool_postgres::Pool;

use crate::models::*;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tracks (
    id               INTEGER PRIMARY KEY,
    title            TEXT NOT NULL,
    artist           TEXT,
    source_path      TEXT,
    duration_ms      INTEGER NOT NULL,
    sample_rate      INTEGER NOT NULL,
    algorithm_params TEXT NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS postings (
    track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    hash     BIGINT NOT NULL,
    t        INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS postings_hash_idx ON postings (hash);
CREATE INDEX IF NOT EXISTS postings_track_idx ON postings (track_id);
";

/// Create tables and indexes if missing
pub async fn ensure_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(SCHEMA)
        .await
        .context("Failed to create schema")?;
    Ok(())
}

/// Store a track and its postings in one transaction, replacing any track
/// with the same id. On failure the previous rows are left as they were.
pub async fn replace_track(pool: &Pool, track: &NewTrack, postings: &[PostingRow]) -> Result<()> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let replaced = tx
        .execute("DELETE FROM tracks WHERE id = $1", &[&track.id])
        .await
        .with_context(|| format!("Failed to clear track {}", track.id))?;

    tx.execute(
        "INSERT INTO tracks
         (id, title, artist, source_path, duration_ms, sample_rate, algorithm_params, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        &[
            &track.id,
            &track.title,
            &track.artist,
            &track.source_path,
            &track.duration_ms,
            &track.sample_rate,
            &track.algorithm_params,
            &track.created_at,
        ],
    )
    .await
    .with_context(|| format!("Failed to insert track {}", track.id))?;

    if !postings.is_empty() {
        let json_array = serde_json::to_value(postings).context("Failed to serialize postings")?;

        tx.execute(
            "INSERT INTO postings (track_id, hash, t)
             SELECT
                 (p->>'track_id')::INTEGER,
                 (p->>'hash')::BIGINT,
                 (p->>'t')::INTEGER
             FROM jsonb_array_elements($1::jsonb) AS p",
            &[&json_array],
        )
        .await
        .context("Failed to batch insert postings")?;
    }

    tx.commit().await.context("Failed to commit track insert")?;
    log::debug!(
        "{} track {} with {} postings",
        if replaced > 0 { "Replaced" } else { "Stored" },
        track.id,
        postings.len()
    );
    Ok(())
}

fn track_from_row(r: &tokio_postgres::Row) -> TrackRow {
    TrackRow {
        id: r.get(0),
        title: r.get(1),
        artist: r.get(2),
        source_path: r.get(3),
        duration_ms: r.get(4),
        sample_rate: r.get(5),
        algorithm_params: r.get(6),
        created_at: r.get(7),
    }
}

/// Get a track by ID
pub async fn get_track(pool: &Pool, id: i32) -> Result<Option<TrackRow>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, title, artist, source_path, duration_ms, sample_rate, algorithm_params, created_at
             FROM tracks
             WHERE id = $1",
            &[&id],
        )
        .await
        .context("Failed to get track")?;

    Ok(row.as_ref().map(track_from_row))
}

/// Get all tracks, ordered by ID
pub async fn get_all_tracks(pool: &Pool) -> Result<Vec<TrackRow>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, title, artist, source_path, duration_ms, sample_rate, algorithm_params, created_at
             FROM tracks
             ORDER BY id",
            &[],
        )
        .await
        .context("Failed to get all tracks")?;

    Ok(rows.iter().map(track_from_row).collect())
}

/// Get all postings of a track in anchor-time order
pub async fn get_postings_by_track(pool: &Pool, track_id: i32) -> Result<Vec<PostingRow>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT track_id, hash, t FROM postings WHERE track_id = $1 ORDER BY t",
            &[&track_id],
        )
        .await
        .context("Failed to get postings by track")?;

    Ok(rows
        .iter()
        .map(|r| PostingRow {
            track_id: r.get(0),
            hash: r.get(1),
            t: r.get(2),
        })
        .collect())
}

/// Delete a track and its postings (cascades); returns whether it existed
pub async fn delete_track(pool: &Pool, id: i32) -> Result<bool> {
    let client = pool.get().await?;

    let deleted = client
        .execute("DELETE FROM tracks WHERE id = $1", &[&id])
        .await
        .context("Failed to delete track")?;

    Ok(deleted > 0)
}
