use std::collections::HashSet;

use crate::Database;
use crate::models::{
    AccountRow, ComplaintRow, FeedbackRow, NewAccount, NewAccountOutcome, NewComplaint, NewFeedback,
    NewNotification, NotificationRow, StaffPointsRow, WriteOutcome,
};
use anyhow::{Result, anyhow};
use flashtrack_types::models::Role;
use rusqlite::{Connection, Row, params};

/// Ids bound per `IN (...)` query.
const ID_CHUNK: usize = 500;

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

const ACCOUNT_COLUMNS: &str = "id, name, email, password, role, society_id, push_token, created_at";

// JOINs resolve resident/staff/category names in one query (no N+1)
const COMPLAINT_SELECT: &str = "
    SELECT c.id, c.title, c.description, c.status,
           c.resident_id, COALESCE(r.name, ''),
           c.staff_id, s.name,
           c.society_id, c.category_id, COALESCE(cat.name, 'General'),
           c.created_at, c.updated_at
    FROM complaints c
    LEFT JOIN accounts r ON c.resident_id = r.id
    LEFT JOIN accounts s ON c.staff_id = s.id
    LEFT JOIN categories cat ON c.category_id = cat.id";

const FEEDBACK_SELECT: &str = "
    SELECT f.id, f.complaint_id, f.resident_id, f.staff_id, f.rating, f.comment, f.points, f.created_at,
           COALESCE(c.title, ''), COALESCE(r.name, ''), COALESCE(s.name, '')
    FROM feedback f
    JOIN complaints c ON f.complaint_id = c.id
    LEFT JOIN accounts r ON f.resident_id = r.id
    LEFT JOIN accounts s ON f.staff_id = s.id";

const NOTIFICATION_COLUMNS: &str =
    "id, account_id, title, message, kind, complaint_id, is_read, created_at";

impl Database {
    // -- Accounts --

    /// Insert an account. Email uniqueness and the one-admin-per-society rule
    /// are checked and written under the same lock; the schema enforces both
    /// as unique indexes too.
    pub fn create_account(&self, account: &NewAccount<'_>) -> Result<NewAccountOutcome> {
        self.with_tx(|tx| {
            if query_account_by_email(tx, account.email)?.is_some() {
                return Ok(NewAccountOutcome::EmailTaken);
            }

            if account.role == Role::Admin {
                let admins: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM accounts WHERE society_id = ?1 AND role = 'admin'",
                    [account.society_id],
                    |row| row.get(0),
                )?;
                if admins > 0 {
                    return Ok(NewAccountOutcome::AdminExists);
                }
            }

            let inserted = tx.execute(
                "INSERT INTO accounts (name, email, password, role, society_id, push_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    account.name,
                    account.email,
                    account.password_hash,
                    account.role.as_str(),
                    account.society_id,
                    account.push_token,
                ],
            );

            match inserted {
                Ok(_) => Ok(NewAccountOutcome::Created(tx.last_insert_rowid())),
                Err(e) if is_unique_violation(&e) => Ok(NewAccountOutcome::EmailTaken),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account_by_email(conn, email))
    }

    pub fn get_account_by_id(&self, id: i64) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS);
            conn.query_row(&sql, [id], account_from_row).optional()
        })
    }

    pub fn list_staff(&self, society_id: i64) -> Result<Vec<AccountRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM accounts WHERE society_id = ?1 AND role = 'staff' ORDER BY name, id",
                ACCOUNT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([society_id], account_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_society_name(&self, id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT name FROM societies WHERE id = ?1", [id], |row| row.get(0))
                .optional()
        })
    }

    // -- Complaints --

    pub fn insert_complaint(&self, complaint: &NewComplaint<'_>) -> Result<ComplaintRow> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO complaints (title, description, resident_id, society_id, category_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    complaint.title,
                    complaint.description,
                    complaint.resident_id,
                    complaint.society_id,
                    complaint.category_id,
                ],
            )?;
            let id = tx.last_insert_rowid();
            query_complaint(tx, id)?.ok_or_else(|| anyhow!("Complaint {} vanished after insert", id))
        })
    }

    pub fn get_complaint(&self, id: i64) -> Result<Option<ComplaintRow>> {
        self.with_conn(|conn| query_complaint(conn, id))
    }

    /// Complaints in a society, newest first, optionally narrowed to one
    /// resident or one assigned staff member.
    pub fn list_complaints(
        &self,
        society_id: i64,
        resident_id: Option<i64>,
        staff_id: Option<i64>,
    ) -> Result<Vec<ComplaintRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 WHERE c.society_id = ?1
                   AND (?2 IS NULL OR c.resident_id = ?2)
                   AND (?3 IS NULL OR c.staff_id = ?3)
                 ORDER BY c.created_at DESC, c.id DESC",
                COMPLAINT_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![society_id, resident_id, staff_id], complaint_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// pending -> in-progress, plus the assignee's notification, in one
    /// transaction. `Stale` if the complaint left `pending` or the target is
    /// no longer a staff member of the same society.
    pub fn assign_staff(
        &self,
        complaint_id: i64,
        staff_id: i64,
        society_id: i64,
        notification: &NewNotification,
    ) -> Result<WriteOutcome<(ComplaintRow, NotificationRow)>> {
        self.with_tx(|tx| {
            let sql = format!(
                "UPDATE complaints SET staff_id = ?2, status = 'in-progress', updated_at = {}
                 WHERE id = ?1 AND status = 'pending' AND society_id = ?3
                   AND EXISTS (
                       SELECT 1 FROM accounts WHERE id = ?2 AND role = 'staff' AND society_id = ?3
                   )",
                NOW
            );
            if tx.execute(&sql, params![complaint_id, staff_id, society_id])? == 0 {
                return Ok(WriteOutcome::Stale);
            }

            let notification = insert_notification(tx, notification)?;
            let complaint = query_complaint(tx, complaint_id)?
                .ok_or_else(|| anyhow!("Complaint {} vanished during assignment", complaint_id))?;
            Ok(WriteOutcome::Applied((complaint, notification)))
        })
    }

    /// in-progress -> resolved by the assignee, plus the resident's
    /// notification, in one transaction.
    pub fn resolve_complaint(
        &self,
        complaint_id: i64,
        staff_id: i64,
        notification: &NewNotification,
    ) -> Result<WriteOutcome<(ComplaintRow, NotificationRow)>> {
        self.with_tx(|tx| {
            let sql = format!(
                "UPDATE complaints SET status = 'resolved', updated_at = {}
                 WHERE id = ?1 AND staff_id = ?2 AND status = 'in-progress'",
                NOW
            );
            if tx.execute(&sql, params![complaint_id, staff_id])? == 0 {
                return Ok(WriteOutcome::Stale);
            }

            let notification = insert_notification(tx, notification)?;
            let complaint = query_complaint(tx, complaint_id)?
                .ok_or_else(|| anyhow!("Complaint {} vanished during resolve", complaint_id))?;
            Ok(WriteOutcome::Applied((complaint, notification)))
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, notification: &NewNotification) -> Result<NotificationRow> {
        self.with_tx(|tx| insert_notification(tx, notification))
    }

    /// Notifications for an account, newest first.
    pub fn list_notifications(&self, account_id: i64, unread_only: bool) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM notifications
                 WHERE account_id = ?1 AND (?2 = 0 OR is_read = 0)
                 ORDER BY created_at DESC, id DESC",
                NOTIFICATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![account_id, unread_only], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when no notification with that id belongs to the account.
    pub fn mark_notification_read(&self, id: i64, account_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND account_id = ?2",
                params![id, account_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Feedback & points --

    /// Record feedback and credit the staff ledger atomically.
    ///
    /// The insert only matches a resolved complaint owned by the resident
    /// (`Stale` otherwise); the UNIQUE index on `complaint_id` turns a second
    /// submission into `Conflict` before the ledger is touched.
    pub fn record_feedback(&self, feedback: &NewFeedback<'_>) -> Result<WriteOutcome<FeedbackRow>> {
        let points = feedback.points();
        self.with_tx(|tx| {
            let inserted = tx.execute(
                "INSERT INTO feedback (complaint_id, resident_id, staff_id, rating, comment, points)
                 SELECT id, resident_id, staff_id, ?3, ?4, ?5 FROM complaints
                 WHERE id = ?1 AND resident_id = ?2 AND status = 'resolved' AND staff_id IS NOT NULL",
                params![
                    feedback.complaint_id,
                    feedback.resident_id,
                    feedback.rating,
                    feedback.comment,
                    points,
                ],
            );

            match inserted {
                Ok(0) => return Ok(WriteOutcome::Stale),
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(WriteOutcome::Conflict),
                Err(e) => return Err(e.into()),
            }

            let id = tx.last_insert_rowid();
            let row = query_feedback(tx, id)?.ok_or_else(|| anyhow!("Feedback {} vanished after insert", id))?;

            tx.execute(
                "INSERT INTO staff_points (staff_id, total_points, tasks_completed)
                 VALUES (?1, ?2, 1)
                 ON CONFLICT(staff_id) DO UPDATE SET
                     total_points = total_points + excluded.total_points,
                     tasks_completed = tasks_completed + 1",
                params![row.staff_id, points],
            )?;

            Ok(WriteOutcome::Applied(row))
        })
    }

    pub fn get_feedback_for_complaint(&self, complaint_id: i64) -> Result<Option<FeedbackRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE f.complaint_id = ?1", FEEDBACK_SELECT);
            conn.query_row(&sql, [complaint_id], feedback_from_row).optional()
        })
    }

    /// Of `complaint_ids`, the ones this resident has already rated.
    /// Which of `complaint_ids` the resident has already rated. Ids are
    /// queried in chunks so large inputs stay under SQLite's bound-variable
    /// limit.
    pub fn rated_complaint_ids(&self, resident_id: i64, complaint_ids: &[i64]) -> Result<HashSet<i64>> {
        if complaint_ids.is_empty() {
            return Ok(HashSet::new());
        }

        self.with_conn(|conn| {
            let mut rated = HashSet::new();
            for chunk in complaint_ids.chunks(ID_CHUNK) {
                let placeholders: Vec<String> = (2..=chunk.len() + 1).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "SELECT complaint_id FROM feedback WHERE resident_id = ?1 AND complaint_id IN ({})",
                    placeholders.join(", ")
                );

                let mut stmt = conn.prepare_cached(&sql)?;
                let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(chunk.len() + 1);
                params.push(&resident_id);
                params.extend(chunk.iter().map(|id| id as &dyn rusqlite::types::ToSql));

                for id in stmt.query_map(params.as_slice(), |row| row.get::<_, i64>(0))? {
                    rated.insert(id?);
                }
            }
            Ok(rated)
        })
    }

    pub fn list_feedback_for_society(&self, society_id: i64) -> Result<Vec<FeedbackRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE c.society_id = ?1 ORDER BY f.created_at DESC, f.id DESC",
                FEEDBACK_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([society_id], feedback_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_staff_points(&self, staff_id: i64) -> Result<Option<StaffPointsRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT staff_id, total_points, tasks_completed FROM staff_points WHERE staff_id = ?1",
                [staff_id],
                |row| {
                    Ok(StaffPointsRow {
                        staff_id: row.get(0)?,
                        total_points: row.get(1)?,
                        tasks_completed: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn query_account_by_email(conn: &Connection, email: &str) -> Result<Option<AccountRow>> {
    let sql = format!("SELECT {} FROM accounts WHERE email = ?1", ACCOUNT_COLUMNS);
    conn.query_row(&sql, [email], account_from_row).optional()
}

fn query_complaint(conn: &Connection, id: i64) -> Result<Option<ComplaintRow>> {
    let sql = format!("{} WHERE c.id = ?1", COMPLAINT_SELECT);
    conn.query_row(&sql, [id], complaint_from_row).optional()
}

fn query_feedback(conn: &Connection, id: i64) -> Result<Option<FeedbackRow>> {
    let sql = format!("{} WHERE f.id = ?1", FEEDBACK_SELECT);
    conn.query_row(&sql, [id], feedback_from_row).optional()
}

fn insert_notification(conn: &Connection, notification: &NewNotification) -> Result<NotificationRow> {
    conn.execute(
        "INSERT INTO notifications (account_id, title, message, kind, complaint_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            notification.account_id,
            notification.title,
            notification.message,
            notification.kind,
            notification.complaint_id,
        ],
    )?;
    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS);
    Ok(conn.query_row(&sql, [id], notification_from_row)?)
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: row.get(4)?,
        society_id: row.get(5)?,
        push_token: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn complaint_from_row(row: &Row<'_>) -> rusqlite::Result<ComplaintRow> {
    Ok(ComplaintRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        resident_id: row.get(4)?,
        resident_name: row.get(5)?,
        staff_id: row.get(6)?,
        staff_name: row.get(7)?,
        society_id: row.get(8)?,
        category_id: row.get(9)?,
        category_name: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        account_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        kind: row.get(4)?,
        complaint_id: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn feedback_from_row(row: &Row<'_>) -> rusqlite::Result<FeedbackRow> {
    Ok(FeedbackRow {
        id: row.get(0)?,
        complaint_id: row.get(1)?,
        resident_id: row.get(2)?,
        staff_id: row.get(3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        points: row.get(6)?,
        created_at: row.get(7)?,
        complaint_title: row.get(8)?,
        resident_name: row.get(9)?,
        staff_name: row.get(10)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
