use dberd::db::DbPool;
use dberd::models::{SourceKind, TableColumn};
use dberd::pipeline::Context;
use dberd::source::source_from_pool;
use sqlx::Row;
use sqlx::mysql::MySqlPoolOptions;

#[tokio::test]
async fn test_extract_mysql_schema() {
    let mysql_url = match std::env::var("TEST_MYSQL_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_MYSQL_URL not set");
            return;
        }
    };

    let pool = MySqlPoolOptions::new()
        .max_connections(2)
        .connect(&mysql_url)
        .await
        .unwrap();

    let database: String = sqlx::query("SELECT DATABASE() AS db")
        .fetch_one(&pool)
        .await
        .unwrap()
        .try_get("db")
        .unwrap();

    let setup = [
        "DROP TABLE IF EXISTS dberd_test_posts",
        "DROP TABLE IF EXISTS dberd_test_authors",
        "CREATE TABLE dberd_test_authors (
            id INT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(100) NOT NULL
        ) ENGINE=InnoDB",
        "CREATE TABLE dberd_test_posts (
            id INT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            author_id INT NOT NULL COMMENT 'written by',
            title VARCHAR(200),
            FOREIGN KEY (author_id) REFERENCES dberd_test_authors(id)
        ) ENGINE=InnoDB",
    ];
    for statement in setup {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    let mut source = source_from_pool(SourceKind::MySql, DbPool::MySql(pool.clone())).unwrap();
    let result = source.extract_schema(&Context::background()).await;
    source.close().await.unwrap();

    for statement in [
        "DROP TABLE IF EXISTS dberd_test_posts",
        "DROP TABLE IF EXISTS dberd_test_authors",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    let schema = result.unwrap().normalized();
    let posts_name = format!("{}.dberd_test_posts", database);
    let authors_name = format!("{}.dberd_test_authors", database);

    let posts = schema.table(&posts_name).unwrap();
    let columns: Vec<_> = posts.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "author_id", "title"]);
    assert!(posts.columns[0].is_primary);
    assert!(!posts.columns[1].is_primary);
    assert_eq!(posts.columns[1].comment.as_deref(), Some("written by"));

    assert!(schema.references.iter().any(|r| {
        r.source == TableColumn::new(posts_name.as_str(), "author_id")
            && r.target == TableColumn::new(authors_name.as_str(), "id")
    }));

    assert!(!pool.is_closed());
    pool.close().await;
}
