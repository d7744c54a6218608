//! Async SQLite-backed datastore client.
//!
//! Every other crate in the workspace talks to persistence exclusively
//! through `Store` — there is no in-process queue and no shared mutex.
//! Mutating methods issue a single statement per call; the dispatch loop's
//! exclusivity guarantee (§8 property 3) comes entirely from
//! [`Store::claim_step`]'s compare-and-set `UPDATE ... WHERE status = ...`.

use std::path::Path;

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::*;

fn enum_to_sql<T: serde::Serialize>(val: &T) -> String {
    let s = serde_json::to_string(val).expect("serialize enum");
    s.trim_matches('"').to_string()
}

fn enum_from_sql<T: serde::de::DeserializeOwned>(raw: &str) -> T {
    let quoted = format!("\"{}\"", raw);
    serde_json::from_str(&quoted).expect("deserialize enum")
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

fn parse_uuid(raw: &str) -> Uuid {
    Uuid::parse_str(raw).expect("valid uuid")
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn new_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), CoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA cache_size=-64000;
                    PRAGMA mmap_size=268435456;
                    PRAGMA temp_store=MEMORY;
                    PRAGMA busy_timeout=5000;

                    CREATE TABLE IF NOT EXISTS teams (
                        id             TEXT PRIMARY KEY,
                        name           TEXT NOT NULL UNIQUE,
                        status         TEXT NOT NULL,
                        lead_agent_id  TEXT,
                        created_at     TEXT NOT NULL,
                        updated_at     TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS agents (
                        id                  TEXT PRIMARY KEY,
                        display_name        TEXT NOT NULL UNIQUE,
                        role                TEXT NOT NULL,
                        agent_type          TEXT NOT NULL,
                        team_id             TEXT,
                        status              TEXT NOT NULL,
                        persona_version_id  TEXT,
                        created_at          TEXT NOT NULL,
                        updated_at          TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_agents_team   ON agents(team_id);
                    CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);

                    CREATE TABLE IF NOT EXISTS name_pool (
                        name         TEXT PRIMARY KEY,
                        source       TEXT NOT NULL,
                        assigned     INTEGER NOT NULL DEFAULT 0,
                        assigned_to  TEXT,
                        assigned_at  TEXT
                    );

                    CREATE TABLE IF NOT EXISTS personas (
                        id              TEXT PRIMARY KEY,
                        agent_id        TEXT NOT NULL,
                        version         INTEGER NOT NULL,
                        identity        TEXT NOT NULL,
                        personality     TEXT NOT NULL,
                        skills          TEXT NOT NULL,
                        background      TEXT NOT NULL,
                        system_prompt   TEXT NOT NULL,
                        created_at      TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_personas_agent ON personas(agent_id);

                    CREATE TABLE IF NOT EXISTS hiring_proposals (
                        id                      TEXT PRIMARY KEY,
                        role_title              TEXT NOT NULL,
                        target_team_id          TEXT NOT NULL,
                        justification           TEXT NOT NULL,
                        status                  TEXT NOT NULL,
                        announced               INTEGER NOT NULL DEFAULT 0,
                        triggering_proposal_id  TEXT,
                        created_agent_id        TEXT,
                        created_at              TEXT NOT NULL,
                        updated_at              TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_hiring_status ON hiring_proposals(status);

                    CREATE TABLE IF NOT EXISTS mission_proposals (
                        id               TEXT PRIMARY KEY,
                        title            TEXT NOT NULL,
                        description      TEXT NOT NULL,
                        priority         TEXT NOT NULL,
                        proposing_agent  TEXT,
                        raw_message      TEXT,
                        status           TEXT NOT NULL,
                        processed        INTEGER NOT NULL DEFAULT 0,
                        created_at       TEXT NOT NULL,
                        updated_at       TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_proposals_status ON mission_proposals(status);

                    CREATE TABLE IF NOT EXISTS missions (
                        id            TEXT PRIMARY KEY,
                        proposal_id   TEXT NOT NULL,
                        team_id       TEXT NOT NULL,
                        title         TEXT NOT NULL,
                        status        TEXT NOT NULL,
                        completed_at  TEXT,
                        created_at    TEXT NOT NULL,
                        updated_at    TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_missions_status ON missions(status);
                    CREATE INDEX IF NOT EXISTS idx_missions_team   ON missions(team_id);

                    CREATE TABLE IF NOT EXISTS mission_steps (
                        id                  TEXT PRIMARY KEY,
                        mission_id          TEXT NOT NULL,
                        description         TEXT NOT NULL,
                        assigned_agent_id   TEXT,
                        model_tier          TEXT NOT NULL,
                        step_order          INTEGER NOT NULL,
                        parent_step_id      TEXT,
                        status              TEXT NOT NULL,
                        result              TEXT,
                        error               TEXT,
                        announced           INTEGER NOT NULL DEFAULT 0,
                        processed           INTEGER NOT NULL DEFAULT 0,
                        started_at          TEXT,
                        created_at          TEXT NOT NULL,
                        updated_at          TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_steps_mission ON mission_steps(mission_id);
                    CREATE INDEX IF NOT EXISTS idx_steps_status  ON mission_steps(status);
                    CREATE INDEX IF NOT EXISTS idx_steps_agent   ON mission_steps(assigned_agent_id);

                    CREATE TABLE IF NOT EXISTS approvals (
                        id                 TEXT PRIMARY KEY,
                        mission_step_id    TEXT NOT NULL,
                        reviewer_agent_id  TEXT NOT NULL,
                        review_type        TEXT NOT NULL,
                        status             TEXT NOT NULL,
                        feedback           TEXT,
                        created_at         TEXT NOT NULL,
                        updated_at         TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_approvals_step ON approvals(mission_step_id);

                    CREATE TABLE IF NOT EXISTS agent_memory (
                        id                 TEXT PRIMARY KEY,
                        agent_id           TEXT NOT NULL,
                        memory_type        TEXT NOT NULL,
                        content            TEXT NOT NULL,
                        summary            TEXT,
                        topic_tags         TEXT NOT NULL,
                        importance         INTEGER NOT NULL,
                        source_type        TEXT,
                        source_id          TEXT,
                        related_agent_ids  TEXT NOT NULL,
                        created_at         TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_memory_agent ON agent_memory(agent_id);

                    CREATE TABLE IF NOT EXISTS lessons (
                        id             TEXT PRIMARY KEY,
                        agent_id       TEXT NOT NULL,
                        text           TEXT NOT NULL,
                        category       TEXT NOT NULL,
                        importance     INTEGER NOT NULL,
                        applied_count  INTEGER NOT NULL DEFAULT 0,
                        created_at     TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_lessons_agent ON lessons(agent_id);

                    CREATE TABLE IF NOT EXISTS agent_skills (
                        id             TEXT PRIMARY KEY,
                        agent_id       TEXT NOT NULL,
                        name           TEXT NOT NULL,
                        proficiency    INTEGER NOT NULL,
                        usage_count    INTEGER NOT NULL,
                        created_at     TEXT NOT NULL,
                        updated_at     TEXT NOT NULL,
                        UNIQUE(agent_id, name)
                    );
                    CREATE INDEX IF NOT EXISTS idx_skills_agent ON agent_skills(agent_id);

                    CREATE TABLE IF NOT EXISTS decision_log (
                        id          TEXT PRIMARY KEY,
                        agent_id    TEXT NOT NULL,
                        text        TEXT NOT NULL,
                        created_at  TEXT NOT NULL
                    );

                    CREATE TABLE IF NOT EXISTS conversation_turns (
                        id               TEXT PRIMARY KEY,
                        agent_id         TEXT NOT NULL,
                        conversation_id  TEXT NOT NULL,
                        role             TEXT NOT NULL,
                        content          TEXT NOT NULL,
                        created_at       TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_turns_conversation ON conversation_turns(conversation_id);

                    CREATE TABLE IF NOT EXISTS events (
                        id          TEXT PRIMARY KEY,
                        event_type  TEXT NOT NULL,
                        severity    TEXT NOT NULL,
                        description TEXT NOT NULL,
                        data        TEXT,
                        processed   INTEGER NOT NULL DEFAULT 0,
                        created_at  TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_events_processed ON events(processed);

                    CREATE TABLE IF NOT EXISTS model_usage (
                        id              TEXT PRIMARY KEY,
                        agent_id        TEXT,
                        step_id         TEXT,
                        model_name      TEXT NOT NULL,
                        tier            TEXT NOT NULL,
                        input_tokens    INTEGER NOT NULL,
                        output_tokens   INTEGER NOT NULL,
                        estimated_cost  REAL NOT NULL,
                        latency_ms      INTEGER NOT NULL,
                        success         INTEGER NOT NULL,
                        error           TEXT,
                        metadata        TEXT,
                        created_at      TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_usage_created ON model_usage(created_at);

                    CREATE TABLE IF NOT EXISTS health_checks (
                        id          TEXT PRIMARY KEY,
                        component   TEXT NOT NULL,
                        status      TEXT NOT NULL,
                        latency_ms  INTEGER NOT NULL,
                        details     TEXT,
                        created_at  TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_health_component ON health_checks(component);

                    CREATE TABLE IF NOT EXISTS policies (
                        id           TEXT PRIMARY KEY,
                        policy_type  TEXT NOT NULL,
                        version      INTEGER NOT NULL,
                        data         TEXT NOT NULL,
                        created_at   TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_policies_type ON policies(policy_type);
                    ",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teams
    // -----------------------------------------------------------------------

    pub async fn upsert_team(&self, team: &Team) -> Result<(), CoreError> {
        let (id, name, status, lead, created, updated) = (
            team.id.to_string(),
            team.name.clone(),
            enum_to_sql(&team.status),
            team.lead_agent_id.map(|u| u.to_string()),
            team.created_at.to_rfc3339(),
            team.updated_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO teams (id, name, status, lead_agent_id, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6)
                     ON CONFLICT(id) DO UPDATE SET
                        name=excluded.name, status=excluded.status,
                        lead_agent_id=excluded.lead_agent_id, updated_at=excluded.updated_at",
                    rusqlite::params![id, name, status, lead, created, updated],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>, CoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, status, lead_agent_id, created_at, updated_at FROM teams",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_team(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    /// Toggles a team between `active`/`inactive` for the `!activate`/
    /// `!deactivate` bridge commands.
    pub async fn set_team_status(&self, id: Uuid, status: TeamStatus) -> Result<(), CoreError> {
        let (id, status, now) = (id.to_string(), enum_to_sql(&status), Utc::now().to_rfc3339());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE teams SET status=?1, updated_at=?2 WHERE id=?3",
                    rusqlite::params![status, now, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    pub async fn upsert_agent(&self, agent: &Agent) -> Result<(), CoreError> {
        let (id, name, role, agent_type, team_id, status, persona_id, created, updated) = (
            agent.id.to_string(),
            agent.display_name.clone(),
            agent.role.clone(),
            enum_to_sql(&agent.agent_type),
            agent.team_id.map(|u| u.to_string()),
            enum_to_sql(&agent.status),
            agent.persona_version_id.map(|u| u.to_string()),
            agent.created_at.to_rfc3339(),
            agent.updated_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO agents (id, display_name, role, agent_type, team_id, status,
                        persona_version_id, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
                     ON CONFLICT(id) DO UPDATE SET
                        display_name=excluded.display_name, role=excluded.role,
                        agent_type=excluded.agent_type, team_id=excluded.team_id,
                        status=excluded.status, persona_version_id=excluded.persona_version_id,
                        updated_at=excluded.updated_at",
                    rusqlite::params![
                        id, name, role, agent_type, team_id, status, persona_id, created, updated
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, CoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, display_name, role, agent_type, team_id, status,
                            persona_version_id, created_at, updated_at
                     FROM agents WHERE id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_agent(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn list_agents_by_team(&self, team_id: Uuid) -> Result<Vec<Agent>, CoreError> {
        let team_id = team_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, display_name, role, agent_type, team_id, status,
                            persona_version_id, created_at, updated_at
                     FROM agents WHERE team_id = ?1 AND status = 'active'",
                )?;
                let mut rows = stmt.query(rusqlite::params![team_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_agent(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn list_active_agents(&self) -> Result<Vec<Agent>, CoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, display_name, role, agent_type, team_id, status,
                            persona_version_id, created_at, updated_at
                     FROM agents WHERE status = 'active'",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_agent(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    /// Full roster regardless of status — the `!roster` bridge command's
    /// base view, distinct from `list_active_agents`.
    pub async fn list_agents(&self) -> Result<Vec<Agent>, CoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, display_name, role, agent_type, team_id, status,
                            persona_version_id, created_at, updated_at
                     FROM agents ORDER BY display_name ASC",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_agent(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn get_agent_by_name(&self, display_name: &str) -> Result<Option<Agent>, CoreError> {
        let display_name = display_name.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, display_name, role, agent_type, team_id, status,
                            persona_version_id, created_at, updated_at
                     FROM agents WHERE display_name = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![display_name])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_agent(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Name pool
    // -----------------------------------------------------------------------

    pub async fn seed_name_pool(&self, entries: Vec<(String, String)>) -> Result<(), CoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (name, source) in &entries {
                    tx.execute(
                        "INSERT OR IGNORE INTO name_pool (name, source, assigned) VALUES (?1, ?2, 0)",
                        rusqlite::params![name, source],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Atomically claims a random unassigned name, preferring
    /// `preferred_source` when given and available, else any source.
    /// Returns `None` when the pool is exhausted.
    pub async fn claim_name(
        &self,
        agent_id: Uuid,
        preferred_source: Option<&str>,
    ) -> Result<Option<String>, CoreError> {
        let agent_id = agent_id.to_string();
        let now = Utc::now().to_rfc3339();
        let preferred_source = preferred_source.map(|s| s.to_string());
        self.conn
            .call(move |conn| {
                let pick = |source: Option<&str>| -> rusqlite::Result<Option<String>> {
                    match source {
                        Some(src) => conn
                            .query_row(
                                "SELECT name FROM name_pool WHERE assigned = 0 AND source = ?1
                                 ORDER BY RANDOM() LIMIT 1",
                                rusqlite::params![src],
                                |r| r.get(0),
                            )
                            .optional(),
                        None => conn
                            .query_row(
                                "SELECT name FROM name_pool WHERE assigned = 0 ORDER BY RANDOM() LIMIT 1",
                                [],
                                |r| r.get(0),
                            )
                            .optional(),
                    }
                };

                let name = match pick(preferred_source.as_deref())? {
                    Some(n) => Some(n),
                    None if preferred_source.is_some() => pick(None)?,
                    None => None,
                };
                let Some(name) = name else {
                    return Ok(None);
                };
                let affected = conn.execute(
                    "UPDATE name_pool SET assigned = 1, assigned_to = ?1, assigned_at = ?2
                     WHERE name = ?3 AND assigned = 0",
                    rusqlite::params![agent_id, now, name],
                )?;
                if affected == 0 {
                    return Ok(None);
                }
                Ok(Some(name))
            })
            .await
            .map_err(CoreError::from)
    }

    /// Releases the pool entry assigned to an agent (e.g. on retirement)
    /// so the name becomes claimable again.
    pub async fn release_name(&self, agent_id: Uuid) -> Result<(), CoreError> {
        let agent_id = agent_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE name_pool SET assigned = 0, assigned_to = NULL, assigned_at = NULL
                     WHERE assigned_to = ?1",
                    rusqlite::params![agent_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Personas
    // -----------------------------------------------------------------------

    pub async fn insert_persona(&self, persona: &Persona) -> Result<(), CoreError> {
        let (id, agent_id, version, identity, personality, skills, background, prompt, created) = (
            persona.id.to_string(),
            persona.agent_id.to_string(),
            persona.version,
            persona.identity.clone(),
            persona.personality.clone(),
            persona.skills.clone(),
            persona.background.clone(),
            persona.system_prompt.clone(),
            persona.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO personas (id, agent_id, version, identity, personality,
                        skills, background, system_prompt, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                    rusqlite::params![
                        id, agent_id, version, identity, personality, skills, background, prompt,
                        created
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn latest_persona(&self, agent_id: Uuid) -> Result<Option<Persona>, CoreError> {
        let agent_id = agent_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_id, version, identity, personality, skills, background,
                            system_prompt, created_at
                     FROM personas WHERE agent_id = ?1 ORDER BY version DESC LIMIT 1",
                )?;
                let mut rows = stmt.query(rusqlite::params![agent_id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_persona(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Hiring proposals
    // -----------------------------------------------------------------------

    pub async fn insert_hiring_proposal(&self, p: &HiringProposal) -> Result<(), CoreError> {
        let (id, role, team, justification, status, announced, trigger, created_agent, created, updated) = (
            p.id.to_string(),
            p.role_title.clone(),
            p.target_team_id.to_string(),
            p.justification.clone(),
            enum_to_sql(&p.status),
            p.announced,
            p.triggering_proposal_id.map(|u| u.to_string()),
            p.created_agent_id.map(|u| u.to_string()),
            p.created_at.to_rfc3339(),
            p.updated_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO hiring_proposals (id, role_title, target_team_id, justification,
                        status, announced, triggering_proposal_id, created_agent_id, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                    rusqlite::params![
                        id, role, team, justification, status, announced as i64, trigger,
                        created_agent, created, updated
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn list_pending_hiring_proposals(&self) -> Result<Vec<HiringProposal>, CoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, role_title, target_team_id, justification, status, announced,
                            triggering_proposal_id, created_agent_id, created_at, updated_at
                     FROM hiring_proposals WHERE status = 'pending' ORDER BY created_at ASC",
                )?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_hiring_proposal(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn get_hiring_proposal(&self, id: Uuid) -> Result<Option<HiringProposal>, CoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, role_title, target_team_id, justification, status, announced,
                            triggering_proposal_id, created_agent_id, created_at, updated_at
                     FROM hiring_proposals WHERE id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_hiring_proposal(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn update_hiring_status(
        &self,
        id: Uuid,
        status: HiringStatus,
        created_agent_id: Option<Uuid>,
    ) -> Result<(), CoreError> {
        let (id, status, created_agent_id, now) = (
            id.to_string(),
            enum_to_sql(&status),
            created_agent_id.map(|u| u.to_string()),
            Utc::now().to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE hiring_proposals SET status=?1, created_agent_id=?2, updated_at=?3
                     WHERE id = ?4",
                    rusqlite::params![status, created_agent_id, now, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mission proposals
    // -----------------------------------------------------------------------

    pub async fn insert_mission_proposal(&self, p: &MissionProposal) -> Result<(), CoreError> {
        let (id, title, desc, priority, agent, raw, status, processed, created, updated) = (
            p.id.to_string(),
            p.title.clone(),
            p.description.clone(),
            enum_to_sql(&p.priority),
            p.proposing_agent.map(|u| u.to_string()),
            p.raw_message.clone(),
            enum_to_sql(&p.status),
            p.processed,
            p.created_at.to_rfc3339(),
            p.updated_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO mission_proposals (id, title, description, priority,
                        proposing_agent, raw_message, status, processed, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                    rusqlite::params![
                        id, title, desc, priority, agent, raw, status, processed as i64, created,
                        updated
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Pops the next unprocessed proposal in priority order (urgent first,
    /// then oldest first), marking it processed in the same statement.
    pub async fn claim_next_proposal(&self) -> Result<Option<MissionProposal>, CoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let found: Option<(String, String)> = tx
                    .query_row(
                        "SELECT id, priority FROM mission_proposals
                         WHERE status = 'pending' AND processed = 0
                         ORDER BY CASE priority WHEN 'urgent' THEN 0 ELSE 1 END, created_at ASC
                         LIMIT 1",
                        [],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .optional()?;
                let Some((id, _)) = found else {
                    tx.commit()?;
                    return Ok(None);
                };
                let affected = tx.execute(
                    "UPDATE mission_proposals SET processed = 1, updated_at = ?1
                     WHERE id = ?2 AND processed = 0",
                    rusqlite::params![Utc::now().to_rfc3339(), id],
                )?;
                if affected == 0 {
                    tx.commit()?;
                    return Ok(None);
                }
                let mut stmt = tx.prepare(
                    "SELECT id, title, description, priority, proposing_agent, raw_message,
                            status, processed, created_at, updated_at
                     FROM mission_proposals WHERE id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                let row = rows.next()?.expect("row exists, just updated");
                let proposal = row_to_mission_proposal(row)?;
                drop(rows);
                stmt.finalize()?;
                tx.commit()?;
                Ok(Some(proposal))
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn update_proposal_status(
        &self,
        id: Uuid,
        status: ProposalStatus,
    ) -> Result<(), CoreError> {
        let (id, status, now) = (id.to_string(), enum_to_sql(&status), Utc::now().to_rfc3339());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE mission_proposals SET status=?1, updated_at=?2 WHERE id=?3",
                    rusqlite::params![status, now, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Missions
    // -----------------------------------------------------------------------

    pub async fn insert_mission(&self, m: &Mission) -> Result<(), CoreError> {
        let (id, proposal_id, team_id, title, status, completed, created, updated) = (
            m.id.to_string(),
            m.proposal_id.to_string(),
            m.team_id.to_string(),
            m.title.clone(),
            enum_to_sql(&m.status),
            m.completed_at.map(|d| d.to_rfc3339()),
            m.created_at.to_rfc3339(),
            m.updated_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO missions (id, proposal_id, team_id, title, status,
                        completed_at, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                    rusqlite::params![id, proposal_id, team_id, title, status, completed, created, updated],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_mission(&self, id: Uuid) -> Result<Option<Mission>, CoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, proposal_id, team_id, title, status, completed_at, created_at, updated_at
                     FROM missions WHERE id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_mission(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    /// Missions in a given status, newest first — the `!status` bridge
    /// command's active-mission count reads from here.
    pub async fn list_missions_by_status(&self, status: MissionStatus) -> Result<Vec<Mission>, CoreError> {
        let status = enum_to_sql(&status);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, proposal_id, team_id, title, status, completed_at, created_at, updated_at
                     FROM missions WHERE status = ?1 ORDER BY created_at DESC",
                )?;
                let mut rows = stmt.query(rusqlite::params![status])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_mission(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn set_mission_status(
        &self,
        id: Uuid,
        status: MissionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), CoreError> {
        let (id, status, completed, now) = (
            id.to_string(),
            enum_to_sql(&status),
            completed_at.map(|d| d.to_rfc3339()),
            Utc::now().to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE missions SET status=?1, completed_at=?2, updated_at=?3 WHERE id=?4",
                    rusqlite::params![status, completed, now, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mission steps
    // -----------------------------------------------------------------------

    pub async fn insert_step(&self, s: &MissionStep) -> Result<(), CoreError> {
        let (id, mission_id, desc, agent, tier, order, parent, status, result, error, announced, processed, started, created, updated) = (
            s.id.to_string(),
            s.mission_id.to_string(),
            s.description.clone(),
            s.assigned_agent_id.map(|u| u.to_string()),
            enum_to_sql(&s.model_tier),
            s.step_order,
            s.parent_step_id.map(|u| u.to_string()),
            enum_to_sql(&s.status),
            s.result.clone(),
            s.error.clone(),
            s.announced,
            s.processed,
            s.started_at.map(|d| d.to_rfc3339()),
            s.created_at.to_rfc3339(),
            s.updated_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO mission_steps (id, mission_id, description, assigned_agent_id,
                        model_tier, step_order, parent_step_id, status, result, error,
                        announced, processed, started_at, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
                    rusqlite::params![
                        id, mission_id, desc, agent, tier, order, parent, status, result, error,
                        announced as i64, processed as i64, started, created, updated
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_step(&self, id: Uuid) -> Result<Option<MissionStep>, CoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(STEP_SELECT)?;
                let mut rows = stmt.query(rusqlite::params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_step(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn steps_for_mission(&self, mission_id: Uuid) -> Result<Vec<MissionStep>, CoreError> {
        let mission_id = mission_id.to_string();
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "{} WHERE mission_id = ?1 ORDER BY step_order ASC",
                    STEP_SELECT_BASE
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![mission_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_step(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    /// Pending steps whose predecessors — every row in the same mission
    /// with a strictly lower `step_order` — are `completed`. This is the
    /// gating invariant for chained phases (§4.1): a step becomes eligible
    /// only once the whole mission has caught up to its order, not merely
    /// once its direct parent (if any) is done.
    pub async fn pending_steps(&self, limit: i64) -> Result<Vec<MissionStep>, CoreError> {
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "{} WHERE status = 'pending' AND NOT EXISTS (
                        SELECT 1 FROM mission_steps AS predecessor
                        WHERE predecessor.mission_id = mission_steps.mission_id
                          AND predecessor.step_order < mission_steps.step_order
                          AND predecessor.status != 'completed'
                     )
                     ORDER BY step_order ASC, created_at ASC LIMIT ?1",
                    STEP_SELECT_BASE
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_step(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    /// Steps awaiting a reviewer's verdict, oldest first — the executor's
    /// review half of the tick pulls from here (§4.9).
    pub async fn review_queue(&self, limit: i64) -> Result<Vec<MissionStep>, CoreError> {
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "{} WHERE status = 'in_review' ORDER BY updated_at ASC LIMIT ?1",
                    STEP_SELECT_BASE
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params![limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_step(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    /// Compare-and-set claim: succeeds only if the step is still `pending`.
    /// Returns `true` on a successful claim, `false` on contention (another
    /// dispatcher tick already claimed it) — never an error.
    pub async fn claim_step(&self, step_id: Uuid, agent_id: Uuid) -> Result<bool, CoreError> {
        let (step_id, agent_id, now) = (step_id.to_string(), agent_id.to_string(), Utc::now().to_rfc3339());
        self.conn
            .call(move |conn| {
                let affected = conn.execute(
                    "UPDATE mission_steps
                     SET status = 'in_progress', assigned_agent_id = ?1, started_at = ?2, updated_at = ?2, processed = 1
                     WHERE id = ?3 AND status = 'pending'",
                    rusqlite::params![agent_id, now, step_id],
                )?;
                Ok(affected > 0)
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn complete_step(&self, step_id: Uuid, result: &str) -> Result<(), CoreError> {
        let (step_id, result, now) = (step_id.to_string(), result.to_string(), Utc::now().to_rfc3339());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE mission_steps SET status = 'in_review', result = ?1, updated_at = ?2
                     WHERE id = ?3",
                    rusqlite::params![result, now, step_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn fail_step(&self, step_id: Uuid, error: &str) -> Result<(), CoreError> {
        let (step_id, error, now) = (step_id.to_string(), error.to_string(), Utc::now().to_rfc3339());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE mission_steps SET status = 'failed', error = ?1, updated_at = ?2
                     WHERE id = ?3",
                    rusqlite::params![error, now, step_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Resets a step to `pending`, clearing its result and `processed`
    /// flag so a later `pending_steps` scan picks it up again (§4.1
    /// `sendBackForRevision`).
    pub async fn send_back_for_revision(&self, step_id: Uuid) -> Result<(), CoreError> {
        let (step_id, now) = (step_id.to_string(), Utc::now().to_rfc3339());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE mission_steps SET status = 'pending', result = NULL,
                        processed = 0, updated_at = ?1
                     WHERE id = ?2",
                    rusqlite::params![now, step_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_step_status(&self, step_id: Uuid, status: StepStatus) -> Result<(), CoreError> {
        let (step_id, status, now) = (step_id.to_string(), enum_to_sql(&status), Utc::now().to_rfc3339());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE mission_steps SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![status, now, step_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Approvals
    // -----------------------------------------------------------------------

    pub async fn insert_approval(&self, a: &Approval) -> Result<(), CoreError> {
        let (id, step_id, reviewer, review_type, status, feedback, created, updated) = (
            a.id.to_string(),
            a.mission_step_id.to_string(),
            a.reviewer_agent_id.to_string(),
            enum_to_sql(&a.review_type),
            enum_to_sql(&a.status),
            a.feedback.clone(),
            a.created_at.to_rfc3339(),
            a.updated_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO approvals (id, mission_step_id, reviewer_agent_id, review_type,
                        status, feedback, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                    rusqlite::params![id, step_id, reviewer, review_type, status, feedback, created, updated],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn approvals_for_step(&self, step_id: Uuid) -> Result<Vec<Approval>, CoreError> {
        let step_id = step_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, mission_step_id, reviewer_agent_id, review_type, status,
                            feedback, created_at, updated_at
                     FROM approvals WHERE mission_step_id = ?1 ORDER BY created_at ASC",
                )?;
                let mut rows = stmt.query(rusqlite::params![step_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_approval(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    /// Counts rejections against a single step, not an agent's whole
    /// history — upskilling (§4.4) triggers on one step being rejected
    /// five times, not five different steps each rejected once.
    pub async fn count_rejections(&self, step_id: Uuid) -> Result<i64, CoreError> {
        let step_id = step_id.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM approvals WHERE mission_step_id = ?1 AND status = 'rejected'",
                    rusqlite::params![step_id],
                    |r| r.get(0),
                )
                .map_err(Into::into)
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Agent memory / lessons
    // -----------------------------------------------------------------------

    pub async fn insert_memory(&self, m: &AgentMemory) -> Result<(), CoreError> {
        let (id, agent_id, mem_type, content, summary, tags, importance, src_type, src_id, related, created) = (
            m.id.to_string(),
            m.agent_id.to_string(),
            enum_to_sql(&m.memory_type),
            m.content.clone(),
            m.summary.clone(),
            serde_json::to_string(&m.topic_tags)?,
            m.importance,
            m.source_type.clone(),
            m.source_id.map(|u| u.to_string()),
            serde_json::to_string(&m.related_agent_ids)?,
            m.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO agent_memory (id, agent_id, memory_type, content, summary,
                        topic_tags, importance, source_type, source_id, related_agent_ids, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                    rusqlite::params![
                        id, agent_id, mem_type, content, summary, tags, importance, src_type,
                        src_id, related, created
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn recent_memory(&self, agent_id: Uuid, limit: i64) -> Result<Vec<AgentMemory>, CoreError> {
        let agent_id = agent_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_id, memory_type, content, summary, topic_tags, importance,
                            source_type, source_id, related_agent_ids, created_at
                     FROM agent_memory WHERE agent_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                )?;
                let mut rows = stmt.query(rusqlite::params![agent_id, limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_memory(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    /// All memory rows for an agent, ordered by importance then recency —
    /// the scan window `retrieve()` draws topic-matched entries from.
    pub async fn memory_for_agent_by_importance(&self, agent_id: Uuid) -> Result<Vec<AgentMemory>, CoreError> {
        let agent_id = agent_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_id, memory_type, content, summary, topic_tags, importance,
                            source_type, source_id, related_agent_ids, created_at
                     FROM agent_memory WHERE agent_id = ?1 ORDER BY importance DESC, created_at DESC",
                )?;
                let mut rows = stmt.query(rusqlite::params![agent_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_memory(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn insert_lesson(&self, l: &Lesson) -> Result<(), CoreError> {
        let (id, agent_id, text, category, importance, applied, created) = (
            l.id.to_string(),
            l.agent_id.to_string(),
            l.text.clone(),
            l.category.clone(),
            l.importance,
            l.applied_count,
            l.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO lessons (id, agent_id, text, category, importance, applied_count, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    rusqlite::params![id, agent_id, text, category, importance, applied, created],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn lessons_for_agent(&self, agent_id: Uuid) -> Result<Vec<Lesson>, CoreError> {
        let agent_id = agent_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_id, text, category, importance, applied_count, created_at
                     FROM lessons WHERE agent_id = ?1 ORDER BY importance DESC",
                )?;
                let mut rows = stmt.query(rusqlite::params![agent_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_lesson(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Agent skills
    // -----------------------------------------------------------------------

    /// Inserts a brand-new skill row, e.g. the initial skill set seeded at
    /// hire time. Use `upsert_skill_usage` to record further uses.
    pub async fn insert_skill(&self, s: &AgentSkill) -> Result<(), CoreError> {
        let (id, agent_id, name, proficiency, usage_count, created, updated) = (
            s.id.to_string(),
            s.agent_id.to_string(),
            s.name.clone(),
            s.proficiency,
            s.usage_count,
            s.created_at.to_rfc3339(),
            s.updated_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO agent_skills (id, agent_id, name, proficiency, usage_count, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    rusqlite::params![id, agent_id, name, proficiency, usage_count, created, updated],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn skills_for_agent(&self, agent_id: Uuid) -> Result<Vec<AgentSkill>, CoreError> {
        let agent_id = agent_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_id, name, proficiency, usage_count, created_at, updated_at
                     FROM agent_skills WHERE agent_id = ?1 ORDER BY name ASC",
                )?;
                let mut rows = stmt.query(rusqlite::params![agent_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_skill(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    /// Cross-trains on first use (inserts at proficiency 1) or bumps an
    /// existing skill's usage count and proficiency (§4.5 `trackSkillUsage`).
    pub async fn upsert_skill_usage(
        &self,
        agent_id: Uuid,
        name: &str,
        proficiency: i64,
        usage_count: i64,
    ) -> Result<(), CoreError> {
        let (agent_id, name, now) = (agent_id.to_string(), name.to_string(), Utc::now().to_rfc3339());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO agent_skills (id, agent_id, name, proficiency, usage_count, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?6)
                     ON CONFLICT(agent_id, name) DO UPDATE SET
                        proficiency=excluded.proficiency, usage_count=excluded.usage_count, updated_at=excluded.updated_at",
                    rusqlite::params![Uuid::new_v4().to_string(), agent_id, name, proficiency, usage_count, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub async fn insert_event(&self, e: &Event) -> Result<(), CoreError> {
        let (id, event_type, severity, description, data, processed, created) = (
            e.id.to_string(),
            e.event_type.clone(),
            enum_to_sql(&e.severity),
            e.description.clone(),
            e.data.as_ref().map(|v| v.to_string()),
            e.processed,
            e.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO events (id, event_type, severity, description, data, processed, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    rusqlite::params![id, event_type, severity, description, data, processed as i64, created],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Model usage
    // -----------------------------------------------------------------------

    pub async fn record_model_usage(&self, u: &ModelUsage) -> Result<(), CoreError> {
        let (id, agent_id, step_id, model_name, tier, input_tokens, output_tokens, cost, latency, success, error, metadata, created) = (
            u.id.to_string(),
            u.agent_id.map(|x| x.to_string()),
            u.step_id.map(|x| x.to_string()),
            u.model_name.clone(),
            enum_to_sql(&u.tier),
            u.input_tokens,
            u.output_tokens,
            u.estimated_cost,
            u.latency_ms,
            u.success,
            u.error.clone(),
            u.metadata.as_ref().map(|v| v.to_string()),
            u.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO model_usage (id, agent_id, step_id, model_name, tier,
                        input_tokens, output_tokens, estimated_cost, latency_ms, success,
                        error, metadata, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
                    rusqlite::params![
                        id, agent_id, step_id, model_name, tier, input_tokens, output_tokens,
                        cost, latency, success as i64, error, metadata, created
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn spend_since(&self, since: DateTime<Utc>) -> Result<f64, CoreError> {
        let since = since.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COALESCE(SUM(estimated_cost), 0.0) FROM model_usage WHERE created_at >= ?1",
                    rusqlite::params![since],
                    |r| r.get(0),
                )
                .map_err(Into::into)
            })
            .await
            .map_err(CoreError::from)
    }

    /// Per-tier spend since `since` — the `!costs` bridge command's tier
    /// breakdown, in tier name (`t1`/`t2`/`t3`) order.
    pub async fn spend_by_tier_since(&self, since: DateTime<Utc>) -> Result<Vec<(String, f64)>, CoreError> {
        let since = since.to_rfc3339();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT tier, COALESCE(SUM(estimated_cost), 0.0) FROM model_usage
                     WHERE created_at >= ?1 GROUP BY tier ORDER BY tier ASC",
                )?;
                let mut rows = stmt.query(rusqlite::params![since])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push((row.get::<_, String>(0)?, row.get::<_, f64>(1)?));
                }
                Ok(out)
            })
            .await
            .map_err(CoreError::from)
    }

    // -----------------------------------------------------------------------
    // Health checks
    // -----------------------------------------------------------------------

    pub async fn insert_health_check(&self, h: &HealthCheck) -> Result<(), CoreError> {
        let (id, component, status, latency, details, created) = (
            h.id.to_string(),
            h.component.clone(),
            enum_to_sql(&h.status),
            h.latency_ms,
            h.details.clone(),
            h.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO health_checks (id, component, status, latency_ms, details, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6)",
                    rusqlite::params![id, component, status, latency, details, created],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Policies
    // -----------------------------------------------------------------------

    pub async fn latest_policy(&self, policy_type: PolicyType) -> Result<Option<Policy>, CoreError> {
        let policy_type = enum_to_sql(&policy_type);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, policy_type, version, data, created_at
                     FROM policies WHERE policy_type = ?1 ORDER BY version DESC LIMIT 1",
                )?;
                let mut rows = stmt.query(rusqlite::params![policy_type])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_policy(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(CoreError::from)
    }

    pub async fn insert_policy(&self, p: &Policy) -> Result<(), CoreError> {
        let (id, policy_type, version, data, created) = (
            p.id.to_string(),
            enum_to_sql(&p.policy_type),
            p.version,
            p.data.to_string(),
            p.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO policies (id, policy_type, version, data, created_at)
                     VALUES (?1,?2,?3,?4,?5)",
                    rusqlite::params![id, policy_type, version, data, created],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

use rusqlite::OptionalExtension;

const STEP_SELECT_BASE: &str = "SELECT id, mission_id, description, assigned_agent_id, model_tier,
    step_order, parent_step_id, status, result, error, announced, processed, started_at,
    created_at, updated_at FROM mission_steps";

const STEP_SELECT: &str = "SELECT id, mission_id, description, assigned_agent_id, model_tier,
    step_order, parent_step_id, status, result, error, announced, processed, started_at,
    created_at, updated_at FROM mission_steps WHERE id = ?1";

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_team(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    let lead: Option<String> = row.get(3)?;
    Ok(Team {
        id: parse_uuid(&row.get::<_, String>(0)?),
        name: row.get(1)?,
        status: enum_from_sql(&row.get::<_, String>(2)?),
        lead_agent_id: lead.map(|s| parse_uuid(&s)),
        created_at: parse_ts(&row.get::<_, String>(4)?),
        updated_at: parse_ts(&row.get::<_, String>(5)?),
    })
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    let team_id: Option<String> = row.get(4)?;
    let persona: Option<String> = row.get(6)?;
    Ok(Agent {
        id: parse_uuid(&row.get::<_, String>(0)?),
        display_name: row.get(1)?,
        role: row.get(2)?,
        agent_type: enum_from_sql(&row.get::<_, String>(3)?),
        team_id: team_id.map(|s| parse_uuid(&s)),
        status: enum_from_sql(&row.get::<_, String>(5)?),
        persona_version_id: persona.map(|s| parse_uuid(&s)),
        created_at: parse_ts(&row.get::<_, String>(7)?),
        updated_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

fn row_to_persona(row: &rusqlite::Row<'_>) -> rusqlite::Result<Persona> {
    Ok(Persona {
        id: parse_uuid(&row.get::<_, String>(0)?),
        agent_id: parse_uuid(&row.get::<_, String>(1)?),
        version: row.get(2)?,
        identity: row.get(3)?,
        personality: row.get(4)?,
        skills: row.get(5)?,
        background: row.get(6)?,
        system_prompt: row.get(7)?,
        created_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

fn row_to_hiring_proposal(row: &rusqlite::Row<'_>) -> rusqlite::Result<HiringProposal> {
    let trigger: Option<String> = row.get(6)?;
    let created_agent: Option<String> = row.get(7)?;
    Ok(HiringProposal {
        id: parse_uuid(&row.get::<_, String>(0)?),
        role_title: row.get(1)?,
        target_team_id: parse_uuid(&row.get::<_, String>(2)?),
        justification: row.get(3)?,
        status: enum_from_sql(&row.get::<_, String>(4)?),
        announced: row.get::<_, i64>(5)? != 0,
        triggering_proposal_id: trigger.map(|s| parse_uuid(&s)),
        created_agent_id: created_agent.map(|s| parse_uuid(&s)),
        created_at: parse_ts(&row.get::<_, String>(8)?),
        updated_at: parse_ts(&row.get::<_, String>(9)?),
    })
}

fn row_to_mission_proposal(row: &rusqlite::Row<'_>) -> rusqlite::Result<MissionProposal> {
    let agent: Option<String> = row.get(4)?;
    Ok(MissionProposal {
        id: parse_uuid(&row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        priority: enum_from_sql(&row.get::<_, String>(3)?),
        proposing_agent: agent.map(|s| parse_uuid(&s)),
        raw_message: row.get(5)?,
        status: enum_from_sql(&row.get::<_, String>(6)?),
        processed: row.get::<_, i64>(7)? != 0,
        created_at: parse_ts(&row.get::<_, String>(8)?),
        updated_at: parse_ts(&row.get::<_, String>(9)?),
    })
}

fn row_to_mission(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mission> {
    let completed: Option<String> = row.get(5)?;
    Ok(Mission {
        id: parse_uuid(&row.get::<_, String>(0)?),
        proposal_id: parse_uuid(&row.get::<_, String>(1)?),
        team_id: parse_uuid(&row.get::<_, String>(2)?),
        title: row.get(3)?,
        status: enum_from_sql(&row.get::<_, String>(4)?),
        completed_at: completed.map(|s| parse_ts(&s)),
        created_at: parse_ts(&row.get::<_, String>(6)?),
        updated_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<MissionStep> {
    let agent: Option<String> = row.get(3)?;
    let parent: Option<String> = row.get(6)?;
    let started: Option<String> = row.get(12)?;
    Ok(MissionStep {
        id: parse_uuid(&row.get::<_, String>(0)?),
        mission_id: parse_uuid(&row.get::<_, String>(1)?),
        description: row.get(2)?,
        assigned_agent_id: agent.map(|s| parse_uuid(&s)),
        model_tier: enum_from_sql(&row.get::<_, String>(4)?),
        step_order: row.get(5)?,
        parent_step_id: parent.map(|s| parse_uuid(&s)),
        status: enum_from_sql(&row.get::<_, String>(7)?),
        result: row.get(8)?,
        error: row.get(9)?,
        announced: row.get::<_, i64>(10)? != 0,
        processed: row.get::<_, i64>(11)? != 0,
        started_at: started.map(|s| parse_ts(&s)),
        created_at: parse_ts(&row.get::<_, String>(13)?),
        updated_at: parse_ts(&row.get::<_, String>(14)?),
    })
}

fn row_to_approval(row: &rusqlite::Row<'_>) -> rusqlite::Result<Approval> {
    Ok(Approval {
        id: parse_uuid(&row.get::<_, String>(0)?),
        mission_step_id: parse_uuid(&row.get::<_, String>(1)?),
        reviewer_agent_id: parse_uuid(&row.get::<_, String>(2)?),
        review_type: enum_from_sql(&row.get::<_, String>(3)?),
        status: enum_from_sql(&row.get::<_, String>(4)?),
        feedback: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
        updated_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentMemory> {
    let source_id: Option<String> = row.get(8)?;
    let tags: String = row.get(5)?;
    let related: String = row.get(9)?;
    Ok(AgentMemory {
        id: parse_uuid(&row.get::<_, String>(0)?),
        agent_id: parse_uuid(&row.get::<_, String>(1)?),
        memory_type: enum_from_sql(&row.get::<_, String>(2)?),
        content: row.get(3)?,
        summary: row.get(4)?,
        topic_tags: serde_json::from_str(&tags).unwrap_or_default(),
        importance: row.get(6)?,
        source_type: row.get(7)?,
        source_id: source_id.map(|s| parse_uuid(&s)),
        related_agent_ids: serde_json::from_str(&related).unwrap_or_default(),
        created_at: parse_ts(&row.get::<_, String>(10)?),
    })
}

fn row_to_lesson(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
    Ok(Lesson {
        id: parse_uuid(&row.get::<_, String>(0)?),
        agent_id: parse_uuid(&row.get::<_, String>(1)?),
        text: row.get(2)?,
        category: row.get(3)?,
        importance: row.get(4)?,
        applied_count: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

fn row_to_skill(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentSkill> {
    Ok(AgentSkill {
        id: parse_uuid(&row.get::<_, String>(0)?),
        agent_id: parse_uuid(&row.get::<_, String>(1)?),
        name: row.get(2)?,
        proficiency: row.get(3)?,
        usage_count: row.get(4)?,
        created_at: parse_ts(&row.get::<_, String>(5)?),
        updated_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

fn row_to_policy(row: &rusqlite::Row<'_>) -> rusqlite::Result<Policy> {
    let data: String = row.get(3)?;
    Ok(Policy {
        id: parse_uuid(&row.get::<_, String>(0)?),
        policy_type: enum_from_sql(&row.get::<_, String>(1)?),
        version: row.get(2)?,
        data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
        created_at: parse_ts(&row.get::<_, String>(4)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_step_is_exclusive_under_contention() {
        let store = Store::new_in_memory().await.unwrap();
        let mission = Mission {
            id: Uuid::new_v4(),
            proposal_id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            title: "test mission".into(),
            status: MissionStatus::InProgress,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_mission(&mission).await.unwrap();
        let step = MissionStep {
            id: Uuid::new_v4(),
            mission_id: mission.id,
            description: "do a thing".into(),
            assigned_agent_id: None,
            model_tier: ModelTier::T1,
            step_order: 0,
            parent_step_id: None,
            status: StepStatus::Pending,
            result: None,
            error: None,
            announced: false,
            processed: false,
            started_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_step(&step).await.unwrap();

        let agent_a = Uuid::new_v4();
        let agent_b = Uuid::new_v4();
        let first = store.claim_step(step.id, agent_a).await.unwrap();
        let second = store.claim_step(step.id, agent_b).await.unwrap();
        assert!(first);
        assert!(!second);

        let fetched = store.get_step(step.id).await.unwrap().unwrap();
        assert_eq!(fetched.assigned_agent_id, Some(agent_a));
        assert_eq!(fetched.status, StepStatus::InProgress);
    }

    #[tokio::test]
    async fn claim_name_exhausts_pool() {
        let store = Store::new_in_memory().await.unwrap();
        store
            .seed_name_pool(vec![("Nova".into(), "seed".into())])
            .await
            .unwrap();
        let agent_id = Uuid::new_v4();
        let first = store.claim_name(agent_id, None).await.unwrap();
        let second = store.claim_name(agent_id, None).await.unwrap();
        assert_eq!(first, Some("Nova".to_string()));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn pending_steps_respects_parent_completion() {
        let store = Store::new_in_memory().await.unwrap();
        let mission_id = Uuid::new_v4();
        let parent = MissionStep {
            id: Uuid::new_v4(),
            mission_id,
            description: "parent".into(),
            assigned_agent_id: None,
            model_tier: ModelTier::T1,
            step_order: 0,
            parent_step_id: None,
            status: StepStatus::Pending,
            result: None,
            error: None,
            announced: false,
            processed: false,
            started_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let child = MissionStep {
            id: Uuid::new_v4(),
            parent_step_id: Some(parent.id),
            step_order: 1,
            ..parent.clone()
        };
        store.insert_step(&parent).await.unwrap();
        store.insert_step(&child).await.unwrap();

        let pending = store.pending_steps(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, parent.id);

        store.set_step_status(parent.id, StepStatus::Completed).await.unwrap();
        let pending = store.pending_steps(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, child.id);
    }
}
