//! Story and scene storage (the content store the renderer reads from).

use chrono::Utc;
use rusqlite::Connection;
use sr_core::{Effect, Error, Overlay, OverlayCategory, Result, Scene, Story, StoryId};

use crate::models::{parse_id, timestamp};

const SCENE_COLS: &str = "id, scene_order, text, image_url, video_url, audio_url,
    word_timestamps, effect, overlay_id, overlay_category, duration";

/// Insert a story and its scenes in one transaction.
///
/// Duplicate scene orders are rejected by the `UNIQUE (story_id, scene_order)`
/// constraint and reported as a validation error.
pub fn insert_story(conn: &Connection, story: &Story) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.execute(
        "INSERT INTO stories (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            story.id.to_string(),
            story.user_id.to_string(),
            story.title,
            timestamp(Utc::now())
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("story {} already exists", story.id))
        }
        other => Error::database(other.to_string()),
    })?;

    for scene in &story.scenes {
        let timestamps = serde_json::to_string(&scene.word_timestamps)
            .map_err(|e| Error::Internal(format!("serialize word timestamps: {e}")))?;
        tx.execute(
            "INSERT INTO scenes (id, story_id, scene_order, text, image_url, video_url,
                 audio_url, word_timestamps, effect, overlay_id, overlay_category, duration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                scene.id.to_string(),
                story.id.to_string(),
                scene.order,
                scene.text,
                scene.image_url,
                scene.video_url,
                scene.audio_url,
                timestamps,
                scene.effect.as_str(),
                scene.overlay.as_ref().map(|o| o.id.as_str()),
                scene.overlay.as_ref().map(|o| o.category.as_str()),
                scene.duration,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Validation(format!(
                    "scene {} conflicts on order {} in story {}",
                    scene.id, scene.order, story.id
                ))
            }
            other => Error::database(other.to_string()),
        })?;
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Load a story with its scenes sorted by order.
pub fn load_story(conn: &Connection, id: StoryId) -> Result<Option<Story>> {
    let header = conn.query_row(
        "SELECT user_id, title FROM stories WHERE id = ?1",
        [id.to_string()],
        |row| Ok((parse_id(row, 0)?, row.get::<_, String>(1)?)),
    );
    let (user_id, title) = match header {
        Ok(h) => h,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(Error::database(e.to_string())),
    };

    let q = format!("SELECT {SCENE_COLS} FROM scenes WHERE story_id = ?1 ORDER BY scene_order");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let scenes = stmt
        .query_map([id.to_string()], scene_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(Some(Story {
        id,
        user_id,
        title,
        scenes,
    }))
}

/// Whether a story exists.
pub fn story_exists(conn: &Connection, id: StoryId) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM stories WHERE id = ?1",
        [id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

fn scene_from_row(row: &rusqlite::Row) -> rusqlite::Result<Scene> {
    let timestamps: String = row.get(6)?;
    let word_timestamps = serde_json::from_str(&timestamps).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let effect: String = row.get(7)?;
    let effect = effect.parse::<Effect>().unwrap_or_else(|e| {
        tracing::warn!("{e}; rendering scene without motion");
        Effect::None
    });

    let overlay_id: Option<String> = row.get(8)?;
    let overlay_category: Option<String> = row.get(9)?;
    let overlay = overlay_id.map(|id| Overlay {
        id,
        category: overlay_category
            .as_deref()
            .map(OverlayCategory::parse)
            .unwrap_or_default(),
    });

    Ok(Scene {
        id: parse_id(row, 0)?,
        order: row.get(1)?,
        text: row.get(2)?,
        image_url: row.get(3)?,
        video_url: row.get(4)?,
        audio_url: row.get(5)?,
        word_timestamps,
        effect,
        overlay,
        duration: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use sr_core::{SceneId, UserId, WordTimestamp};

    fn scene(order: u32, text: &str) -> Scene {
        Scene {
            id: SceneId::new(),
            order,
            text: text.to_string(),
            image_url: Some(format!("https://cdn.example.com/{order}.png")),
            video_url: None,
            audio_url: None,
            word_timestamps: vec![],
            effect: Effect::ZoomIn,
            overlay: None,
            duration: 0.0,
        }
    }

    #[test]
    fn insert_and_load_orders_scenes() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let mut second = scene(1, "second");
        second.word_timestamps = vec![WordTimestamp {
            word: "second".into(),
            start: 0.1,
            end: 0.6,
        }];
        second.overlay = Some(Overlay {
            id: "film-01".into(),
            category: OverlayCategory::Film,
        });
        let story = Story {
            id: StoryId::new(),
            user_id: UserId::new(),
            title: "Tide".into(),
            scenes: vec![second.clone(), scene(0, "first")],
        };
        insert_story(&conn, &story).unwrap();

        let loaded = load_story(&conn, story.id).unwrap().unwrap();
        assert_eq!(loaded.user_id, story.user_id);
        assert_eq!(loaded.scenes.len(), 2);
        assert_eq!(loaded.scenes[0].text, "first");
        assert_eq!(loaded.scenes[1], second);
    }

    #[test]
    fn load_missing_story() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        assert!(load_story(&conn, StoryId::new()).unwrap().is_none());
        assert!(!story_exists(&conn, StoryId::new()).unwrap());
    }

    #[test]
    fn duplicate_order_rolls_back() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let story = Story {
            id: StoryId::new(),
            user_id: UserId::new(),
            title: String::new(),
            scenes: vec![scene(0, "a"), scene(0, "b")],
        };
        let err = insert_story(&conn, &story).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!story_exists(&conn, story.id).unwrap());
    }

    #[test]
    fn duplicate_story_is_conflict() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let story = Story {
            id: StoryId::new(),
            user_id: UserId::new(),
            title: String::new(),
            scenes: vec![scene(0, "a")],
        };
        insert_story(&conn, &story).unwrap();
        let err = insert_story(&conn, &story).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
