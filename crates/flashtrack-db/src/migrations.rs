use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE societies (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE categories (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL UNIQUE
            );

            CREATE TABLE accounts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('resident', 'staff', 'admin')),
                society_id  INTEGER NOT NULL,
                push_token  TEXT,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_accounts_society_role ON accounts(society_id, role);

            -- One admin per society
            CREATE UNIQUE INDEX idx_accounts_society_admin
                ON accounts(society_id) WHERE role = 'admin';

            CREATE TABLE complaints (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                title        TEXT NOT NULL,
                description  TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'pending'
                             CHECK (status IN ('pending', 'in-progress', 'resolved')),
                resident_id  INTEGER NOT NULL REFERENCES accounts(id),
                staff_id     INTEGER REFERENCES accounts(id),
                society_id   INTEGER NOT NULL,
                category_id  INTEGER NOT NULL,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                CHECK ((status = 'pending') = (staff_id IS NULL))
            );

            CREATE INDEX idx_complaints_society ON complaints(society_id, created_at);

            CREATE TABLE notifications (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id    INTEGER NOT NULL REFERENCES accounts(id),
                title         TEXT NOT NULL,
                message       TEXT NOT NULL,
                kind          TEXT NOT NULL,
                complaint_id  INTEGER REFERENCES complaints(id),
                is_read       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_notifications_account ON notifications(account_id, created_at);

            CREATE TABLE feedback (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                complaint_id  INTEGER NOT NULL UNIQUE REFERENCES complaints(id),
                resident_id   INTEGER NOT NULL REFERENCES accounts(id),
                staff_id      INTEGER NOT NULL REFERENCES accounts(id),
                rating        INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment       TEXT NOT NULL DEFAULT '',
                points        INTEGER NOT NULL,
                created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE staff_points (
                staff_id         INTEGER PRIMARY KEY REFERENCES accounts(id),
                total_points     INTEGER NOT NULL DEFAULT 0,
                tasks_completed  INTEGER NOT NULL DEFAULT 0
            );

            INSERT INTO societies (id, name) VALUES
                (1, 'Green Valley Society'),
                (2, 'Sunrise Apartments'),
                (3, 'Palm Heights'),
                (4, 'Ocean View Residency');

            -- Ids are shared with the dashboard's category picker
            INSERT INTO categories (id, name) VALUES
                (1, 'Plumbing'),
                (2, 'Electrical'),
                (3, 'Maintenance'),
                (4, 'Security');

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
