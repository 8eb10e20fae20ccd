use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{EntityStore, PostFilter, PostOrder, PostQuery};
use crate::models::{
    current_time_millis, millis_to_datetime, Comment, EntityRef, EntityType, Follow, Group,
    GroupField, NewComment, NewGroup, NewPost, NewUser, Post, PostField, User,
};
use crate::schema::{self, ReferenceKind};
use crate::validation::{self, DUPLICATE_FOLLOW};

const POST_SELECT: &str = "SELECT p.id, p.text, p.created_at, p.author_id, \
     u.username AS author_username, p.group_id, g.slug AS group_slug, p.image \
     FROM posts p \
     JOIN users u ON u.id = p.author_id \
     LEFT JOIN post_groups g ON g.id = p.group_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, \
     u.username AS author_username, c.text, c.created_at \
     FROM comments c \
     JOIN users u ON u.id = c.author_id";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS post_groups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL CHECK (text <> ''),
        created_at INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        group_id INTEGER,
        image TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id INTEGER,
        author_id INTEGER NOT NULL,
        text TEXT NOT NULL CHECK (text <> ''),
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS follows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        UNIQUE (user_id, author_id),
        CHECK (user_id <> author_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_posts_group ON posts(group_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_follows_author ON follows(author_id)",
];

/// SQLite-backed entity store. Works against a file or `sqlite::memory:`.
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                AppError::ConfigurationError(format!("Invalid database URL {}: {}", url, e))
            })?
            .create_if_missing(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            // Each connection to an in-memory database sees its own database
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            let filename = options.clone().get_filename();
            if let Some(parent) = filename.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AppError::ConfigurationError(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e))
        })?;

        let db = Self { pool };
        db.initialize().await?;
        info!("Entity store ready at {}", url);
        Ok(db)
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn initialize(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::from_sqlx("Failed to initialize schema", e))?;
        }
        Ok(())
    }

    async fn ensure_exists(&self, entity: EntityRef) -> AppResult<()> {
        if !self.exists(entity).await? {
            return Err(AppError::NotFound(format!("{} not found", entity)));
        }
        Ok(())
    }

    /// Called after a guarded insert wrote nothing: report which reference was missing.
    async fn missing_reference(&self, references: &[EntityRef]) -> AppError {
        for reference in references {
            if let Err(err) = self.ensure_exists(*reference).await {
                return err;
            }
        }
        AppError::Internal("guarded insert matched no rows".to_string())
    }
}

fn post_from_row(row: &SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        text: row.get("text"),
        created_at: millis_to_datetime(row.get("created_at")),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        group_id: row.get("group_id"),
        group_slug: row.get("group_slug"),
        image: row.get("image"),
    }
}

fn comment_from_row(row: &SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        text: row.get("text"),
        created_at: millis_to_datetime(row.get("created_at")),
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
    }
}

fn group_from_row(row: &SqliteRow) -> Group {
    Group {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
    }
}

fn follow_from_row(row: &SqliteRow) -> Follow {
    Follow {
        id: row.get("id"),
        user_id: row.get("user_id"),
        author_id: row.get("author_id"),
    }
}

fn push_post_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: PostFilter) {
    match filter {
        PostFilter::All => {}
        PostFilter::Group(group_id) => {
            qb.push(" WHERE p.group_id = ");
            qb.push_bind(group_id);
        }
        PostFilter::Author(author_id) => {
            qb.push(" WHERE p.author_id = ");
            qb.push_bind(author_id);
        }
        PostFilter::FollowedBy(user_id) => {
            qb.push(" WHERE p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ");
            qb.push_bind(user_id);
            qb.push(")");
        }
    }
}

/// Ids bound per statement, well below SQLite's variable limit.
const ID_CHUNK_SIZE: usize = 500;

/// Post rows also hand back their attachment reference.
fn returning_clause(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Post => " RETURNING id, image",
        _ => " RETURNING id",
    }
}

fn collect_attachment(entity_type: EntityType, row: &SqliteRow, attachments: &mut Vec<String>) {
    if entity_type == EntityType::Post {
        if let Some(image) = row.get::<Option<String>, _>("image") {
            attachments.push(image);
        }
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(",");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");
}

/// Rewrap a unique-index hit with a caller-facing message.
fn constraint_message(err: AppError, message: String) -> AppError {
    if err.is_constraint_violation() {
        AppError::ConstraintViolation(message)
    } else {
        err
    }
}

#[async_trait]
impl EntityStore for SqliteDatabase {
    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        validation::validate_new_user(&user)?;
        let display_name = user.display_name.clone().unwrap_or_default();

        let result = sqlx::query("INSERT INTO users (username, display_name) VALUES (?, ?)")
            .bind(user.username.as_str())
            .bind(display_name.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                constraint_message(
                    AppError::from_sqlx("Failed to create user", e),
                    format!("username {:?} already exists", user.username),
                )
            })?;

        let created = User {
            id: result.last_insert_rowid(),
            username: user.username,
            display_name,
        };
        info!(user_id = created.id, "Created user");
        Ok(created)
    }

    async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT id, username, display_name FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(&format!("Failed to get user {}", id), e))?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT id, username, display_name FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(&format!("Failed to get user {}", username), e))?;
        Ok(row.as_ref().map(user_from_row))
    }

    #[instrument(skip(self, group), fields(slug = %group.slug))]
    async fn create_group(&self, group: NewGroup) -> AppResult<Group> {
        validation::validate_new_group(&group)?;

        let result =
            sqlx::query("INSERT INTO post_groups (title, slug, description) VALUES (?, ?, ?)")
                .bind(group.title.as_str())
                .bind(group.slug.as_str())
                .bind(group.description.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    constraint_message(
                        AppError::from_sqlx("Failed to create group", e),
                        format!("slug {:?} already exists", group.slug),
                    )
                })?;

        let created = Group {
            id: result.last_insert_rowid(),
            title: group.title,
            slug: group.slug,
            description: group.description,
        };
        info!(group_id = created.id, "Created group");
        Ok(created)
    }

    async fn get_group(&self, id: i64) -> AppResult<Option<Group>> {
        let row = sqlx::query("SELECT id, title, slug, description FROM post_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(&format!("Failed to get group {}", id), e))?;
        Ok(row.as_ref().map(group_from_row))
    }

    async fn get_group_by_slug(&self, slug: &str) -> AppResult<Option<Group>> {
        let row =
            sqlx::query("SELECT id, title, slug, description FROM post_groups WHERE slug = ?")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::from_sqlx(&format!("Failed to get group {}", slug), e))?;
        Ok(row.as_ref().map(group_from_row))
    }

    #[instrument(skip(self, fields))]
    async fn update_group(&self, id: i64, fields: Vec<GroupField>) -> AppResult<Group> {
        for field in &fields {
            match field {
                GroupField::Title(title) => validation::validate_title(title)?,
                GroupField::Slug(slug) => validation::validate_slug(slug)?,
                GroupField::Description(_) => {}
            }
        }

        if !fields.is_empty() {
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE post_groups SET ");
            {
                let mut assignments = qb.separated(", ");
                for field in fields {
                    match field {
                        GroupField::Title(title) => {
                            assignments.push("title = ");
                            assignments.push_bind_unseparated(title);
                        }
                        GroupField::Slug(slug) => {
                            assignments.push("slug = ");
                            assignments.push_bind_unseparated(slug);
                        }
                        GroupField::Description(description) => {
                            assignments.push("description = ");
                            assignments.push_bind_unseparated(description);
                        }
                    }
                }
            }
            qb.push(" WHERE id = ");
            qb.push_bind(id);

            let result = qb.build().execute(&self.pool).await.map_err(|e| {
                constraint_message(
                    AppError::from_sqlx(&format!("Failed to update group {}", id), e),
                    "slug already exists".to_string(),
                )
            })?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound(format!("{} not found", EntityRef::group(id))));
            }
        }

        self.get_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", EntityRef::group(id))))
    }

    #[instrument(skip(self, post), fields(author_id = post.author_id, group_id = ?post.group_id))]
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        validation::validate_post_text(&post.text)?;
        let now = current_time_millis();

        // References are checked in the same statement as the insert
        let result = sqlx::query(
            "INSERT INTO posts (text, created_at, author_id, group_id, image) \
             SELECT ?, ?, ?, ?, ? \
             WHERE EXISTS (SELECT 1 FROM users WHERE id = ?) \
             AND (? IS NULL OR EXISTS (SELECT 1 FROM post_groups WHERE id = ?))",
        )
        .bind(post.text.as_str())
        .bind(now)
        .bind(post.author_id)
        .bind(post.group_id)
        .bind(post.image.as_deref())
        .bind(post.author_id)
        .bind(post.group_id)
        .bind(post.group_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create post", e))?;

        if result.rows_affected() == 0 {
            let mut references = vec![EntityRef::user(post.author_id)];
            references.extend(post.group_id.map(EntityRef::group));
            return Err(self.missing_reference(&references).await);
        }

        let id = result.last_insert_rowid();
        info!(post_id = id, "Created post");
        self.get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", EntityRef::post(id))))
    }

    async fn get_post(&self, id: i64) -> AppResult<Option<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(POST_SELECT);
        qb.push(" WHERE p.id = ");
        qb.push_bind(id);

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(&format!("Failed to get post {}", id), e))?;
        Ok(row.as_ref().map(post_from_row))
    }

    #[instrument(skip(self, fields))]
    async fn update_post(&self, id: i64, fields: Vec<PostField>) -> AppResult<Post> {
        for field in &fields {
            if schema::is_immutable(EntityType::Post, field.name()) {
                return Err(AppError::Validation(format!("{} is immutable", field.name())));
            }
            if let PostField::Text(text) = field {
                validation::validate_post_text(text)?;
            }
        }

        if !fields.is_empty() {
            let mut group_check = None;
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE posts SET ");
            {
                let mut assignments = qb.separated(", ");
                for field in fields {
                    match field {
                        PostField::Text(text) => {
                            assignments.push("text = ");
                            assignments.push_bind_unseparated(text);
                        }
                        PostField::Group(group_id) => {
                            assignments.push("group_id = ");
                            assignments.push_bind_unseparated(group_id);
                            group_check = group_id;
                        }
                        PostField::Image(image) => {
                            assignments.push("image = ");
                            assignments.push_bind_unseparated(image);
                        }
                        // rejected above
                        PostField::CreatedAt(_) => {}
                    }
                }
            }
            qb.push(" WHERE id = ");
            qb.push_bind(id);
            if let Some(group_id) = group_check {
                qb.push(" AND EXISTS (SELECT 1 FROM post_groups WHERE id = ");
                qb.push_bind(group_id);
                qb.push(")");
            }

            let result = qb
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::from_sqlx(&format!("Failed to update post {}", id), e))?;

            if result.rows_affected() == 0 {
                let mut references = vec![EntityRef::post(id)];
                references.extend(group_check.map(EntityRef::group));
                return Err(self.missing_reference(&references).await);
            }
            debug!(post_id = id, "Updated post");
        }

        self.get_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", EntityRef::post(id))))
    }

    #[instrument(skip(self))]
    async fn find_posts(&self, query: &PostQuery) -> AppResult<Vec<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(POST_SELECT);
        push_post_filter(&mut qb, query.filter);

        match query.order {
            PostOrder::NewestFirst => {
                qb.push(" ORDER BY p.created_at DESC, p.id DESC");
            }
            PostOrder::OldestFirst => {
                qb.push(" ORDER BY p.created_at ASC, p.id ASC");
            }
        }

        match (query.limit, query.offset) {
            (Some(limit), offset) => {
                qb.push(" LIMIT ");
                qb.push_bind(limit as i64);
                if let Some(offset) = offset {
                    qb.push(" OFFSET ");
                    qb.push_bind(offset as i64);
                }
            }
            (None, Some(offset)) => {
                qb.push(" LIMIT -1 OFFSET ");
                qb.push_bind(offset as i64);
            }
            (None, None) => {}
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to find posts", e))?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    async fn count_posts(&self, filter: PostFilter) -> AppResult<usize> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM posts p");
        push_post_filter(&mut qb, filter);

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to count posts", e))?;
        Ok(row.get::<i64, _>("count") as usize)
    }

    #[instrument(skip(self, comment), fields(post_id = comment.post_id, author_id = comment.author_id))]
    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        validation::validate_comment_text(&comment.text)?;
        let now = current_time_millis();

        let result = sqlx::query(
            "INSERT INTO comments (post_id, author_id, text, created_at) \
             SELECT ?, ?, ?, ? \
             WHERE EXISTS (SELECT 1 FROM posts WHERE id = ?) \
             AND EXISTS (SELECT 1 FROM users WHERE id = ?)",
        )
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(comment.text.as_str())
        .bind(now)
        .bind(comment.post_id)
        .bind(comment.author_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create comment", e))?;

        if result.rows_affected() == 0 {
            return Err(self
                .missing_reference(&[EntityRef::post(comment.post_id), EntityRef::user(comment.author_id)])
                .await);
        }

        let id = result.last_insert_rowid();
        info!(comment_id = id, "Created comment");
        self.get_comment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", EntityRef::comment(id))))
    }

    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>> {
        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_SELECT);
        qb.push(" WHERE c.id = ");
        qb.push_bind(id);

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx(&format!("Failed to get comment {}", id), e))?;
        Ok(row.as_ref().map(comment_from_row))
    }

    async fn find_comments_for_post(&self, post_id: i64) -> AppResult<Vec<Comment>> {
        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_SELECT);
        qb.push(" WHERE c.post_id = ");
        qb.push_bind(post_id);
        qb.push(" ORDER BY c.created_at ASC, c.id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(|e| {
            AppError::from_sqlx(&format!("Failed to get comments for post {}", post_id), e)
        })?;
        Ok(rows.iter().map(comment_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn create_follow(&self, user_id: i64, author_id: i64) -> AppResult<Follow> {
        validation::validate_follow(user_id, author_id)?;

        let result = sqlx::query(
            "INSERT INTO follows (user_id, author_id) \
             SELECT ?, ? \
             WHERE EXISTS (SELECT 1 FROM users WHERE id = ?) \
             AND EXISTS (SELECT 1 FROM users WHERE id = ?)",
        )
        .bind(user_id)
        .bind(author_id)
        .bind(user_id)
        .bind(author_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            constraint_message(
                AppError::from_sqlx("Failed to create follow", e),
                DUPLICATE_FOLLOW.to_string(),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(self
                .missing_reference(&[EntityRef::user(user_id), EntityRef::user(author_id)])
                .await);
        }

        let follow = Follow {
            id: result.last_insert_rowid(),
            user_id,
            author_id,
        };
        info!(follow_id = follow.id, "Created follow");
        Ok(follow)
    }

    #[instrument(skip(self))]
    async fn follow_if_absent(&self, user_id: i64, author_id: i64) -> AppResult<bool> {
        validation::validate_follow(user_id, author_id)?;

        // The WHERE clause is required for SQLite to parse the upsert after a SELECT
        let result = sqlx::query(
            "INSERT INTO follows (user_id, author_id) \
             SELECT ?, ? \
             WHERE EXISTS (SELECT 1 FROM users WHERE id = ?) \
             AND EXISTS (SELECT 1 FROM users WHERE id = ?) \
             ON CONFLICT (user_id, author_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(author_id)
        .bind(user_id)
        .bind(author_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to create follow", e))?;

        if result.rows_affected() == 0 {
            self.ensure_exists(EntityRef::user(user_id)).await?;
            self.ensure_exists(EntityRef::user(author_id)).await?;
            debug!("Follow already present");
            return Ok(false);
        }
        info!("Created follow");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn delete_follow(&self, user_id: i64, author_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to delete follow", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn follow_exists(&self, user_id: i64, author_id: i64) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user_id)
            .bind(author_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to check follow", e))?;
        Ok(row.is_some())
    }

    async fn find_following(&self, user_id: i64) -> AppResult<Vec<Follow>> {
        let rows = sqlx::query(
            "SELECT id, user_id, author_id FROM follows WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to list follows", e))?;
        Ok(rows.iter().map(follow_from_row).collect())
    }

    async fn find_followers(&self, author_id: i64) -> AppResult<Vec<Follow>> {
        let rows = sqlx::query(
            "SELECT id, user_id, author_id FROM follows WHERE author_id = ? ORDER BY id",
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx("Failed to list followers", e))?;
        Ok(rows.iter().map(follow_from_row).collect())
    }

    #[instrument(skip(self, entity), fields(entity = %entity))]
    async fn delete_collecting_attachments(&self, entity: EntityRef) -> AppResult<Option<Vec<String>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to begin transaction", e))?;

        // Deleting first takes the write lock before any dependent is read
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "DELETE FROM {} WHERE id = ",
            entity.entity_type.table()
        ));
        qb.push_bind(entity.id);
        qb.push(returning_clause(entity.entity_type));
        let root = qb
            .build()
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::from_sqlx(&format!("Failed to delete {}", entity), e))?;

        let Some(root) = root else {
            tx.rollback()
                .await
                .map_err(|e| AppError::from_sqlx("Failed to roll back transaction", e))?;
            return Ok(None);
        };

        let mut attachments = Vec::new();
        collect_attachment(entity.entity_type, &root, &mut attachments);

        let mut pending = vec![(entity.entity_type, vec![entity.id])];
        while let Some((target, ids)) = pending.pop() {
            for relation in schema::relations_targeting(target) {
                let table = relation.from.table();
                match relation.kind {
                    ReferenceKind::Weak => {
                        let mut cleared = 0;
                        for chunk in ids.chunks(ID_CHUNK_SIZE) {
                            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                                "UPDATE {} SET {} = NULL WHERE {} IN ",
                                table, relation.column, relation.column
                            ));
                            push_id_list(&mut qb, chunk);
                            let result = qb.build().execute(&mut *tx).await.map_err(|e| {
                                AppError::from_sqlx(&format!("Failed to clear {}", relation.name), e)
                            })?;
                            cleared += result.rows_affected();
                        }
                        debug!(relation = relation.name, rows = cleared, "Cleared weak references");
                    }
                    ReferenceKind::Strong => {
                        let mut dependents = Vec::new();
                        for chunk in ids.chunks(ID_CHUNK_SIZE) {
                            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                                "DELETE FROM {} WHERE {} IN ",
                                table, relation.column
                            ));
                            push_id_list(&mut qb, chunk);
                            qb.push(returning_clause(relation.from));
                            let rows = qb.build().fetch_all(&mut *tx).await.map_err(|e| {
                                AppError::from_sqlx(&format!("Failed to cascade {}", relation.name), e)
                            })?;
                            for row in &rows {
                                dependents.push(row.get::<i64, _>("id"));
                                collect_attachment(relation.from, row, &mut attachments);
                            }
                        }
                        debug!(
                            relation = relation.name,
                            rows = dependents.len(),
                            "Cascaded delete"
                        );
                        if !dependents.is_empty() {
                            pending.push((relation.from, dependents));
                        }
                    }
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::from_sqlx("Failed to commit transaction", e))?;
        info!(attachments = attachments.len(), "Deleted {}", entity);
        Ok(Some(attachments))
    }

    async fn exists(&self, entity: EntityRef) -> AppResult<bool> {
        let row = sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE id = ?",
            entity.entity_type.table()
        ))
        .bind(entity.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx(&format!("Failed to check {}", entity), e))?;
        Ok(row.is_some())
    }

    async fn count(&self, entity_type: EntityType) -> AppResult<usize> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM {}",
            entity_type.table()
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_sqlx(&format!("Failed to count {}", entity_type), e))?;
        Ok(row.get::<i64, _>("count") as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteDatabase {
        SqliteDatabase::new_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let db = store().await;
        db.initialize().await.unwrap();
        assert_eq!(db.count(EntityType::Post).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_author_is_not_found() {
        let db = store().await;
        let err = db.create_post(NewPost::new(42, "orphan")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(db.count(EntityType::Post).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_group_is_not_found() {
        let db = store().await;
        let author = db.create_user(NewUser::new("author")).await.unwrap();
        let err = db
            .create_post(NewPost::new(author.id, "text").group(99))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(msg) if msg.contains("group")));
    }

    #[tokio::test]
    async fn test_offset_without_limit() {
        let db = store().await;
        let author = db.create_user(NewUser::new("author")).await.unwrap();
        for i in 0..4 {
            db.create_post(NewPost::new(author.id, &format!("post {}", i)))
                .await
                .unwrap();
        }

        let rest = db
            .find_posts(&PostQuery::new(PostFilter::All).offset(1))
            .await
            .unwrap();
        let texts: Vec<_> = rest.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["post 2", "post 1", "post 0"]);
    }

    #[tokio::test]
    async fn test_user_cascade_beyond_variable_limit() {
        let db = store().await;
        let author = db.create_user(NewUser::new("prolific")).await.unwrap();
        let reader = db.create_user(NewUser::new("reader")).await.unwrap();
        db.create_follow(reader.id, author.id).await.unwrap();

        let total: i64 = 33_000;
        sqlx::query(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?) \
             INSERT INTO posts (text, created_at, author_id) SELECT 'post ' || n, n, ? FROM seq",
        )
        .bind(total)
        .bind(author.id)
        .execute(&db.pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO comments (post_id, author_id, text, created_at) \
             SELECT id, ?, 'reply', created_at FROM posts WHERE author_id = ?",
        )
        .bind(reader.id)
        .bind(author.id)
        .execute(&db.pool)
        .await
        .unwrap();

        assert!(db.delete(EntityRef::user(author.id)).await.unwrap());

        assert_eq!(db.count(EntityType::Post).await.unwrap(), 0);
        assert_eq!(db.count(EntityType::Follow).await.unwrap(), 0);
        assert_eq!(db.count(EntityType::Comment).await.unwrap(), total as usize);
        let still_linked: i64 = sqlx::query("SELECT COUNT(*) AS count FROM comments WHERE post_id IS NOT NULL")
            .fetch_one(&db.pool)
            .await
            .unwrap()
            .get("count");
        assert_eq!(still_linked, 0);
    }

    #[tokio::test]
    async fn test_delete_reports_cascaded_attachments() {
        let db = store().await;
        let author = db.create_user(NewUser::new("author")).await.unwrap();
        let post = db
            .create_post(NewPost::new(author.id, "with image").image("posts/a.gif"))
            .await
            .unwrap();
        db.create_post(NewPost::new(author.id, "plain")).await.unwrap();
        db.create_post(NewPost::new(author.id, "another").image("posts/b.gif"))
            .await
            .unwrap();

        let only_post = db
            .delete_collecting_attachments(EntityRef::post(post.id))
            .await
            .unwrap();
        assert_eq!(only_post, Some(vec!["posts/a.gif".to_string()]));

        let cascaded = db
            .delete_collecting_attachments(EntityRef::user(author.id))
            .await
            .unwrap();
        assert_eq!(cascaded, Some(vec!["posts/b.gif".to_string()]));

        let missing = db
            .delete_collecting_attachments(EntityRef::user(author.id))
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("blog.db");
        let url = format!("sqlite:{}", path.display());

        let db = SqliteDatabase::connect(&url).await.unwrap();
        db.create_user(NewUser::new("author")).await.unwrap();
        assert!(path.exists());
    }
}
