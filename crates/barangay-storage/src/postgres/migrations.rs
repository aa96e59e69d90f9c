use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS households (
        id          UUID PRIMARY KEY,
        unit_code   TEXT NOT NULL,
        version     BIGINT NOT NULL DEFAULT 1,
        data        JSONB NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_households_unit
    ON households (unit_code, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS residents (
        id            UUID PRIMARY KEY,
        unit_code     TEXT NOT NULL,
        household_id  UUID REFERENCES households(id),
        is_active     BOOLEAN NOT NULL,
        version       BIGINT NOT NULL DEFAULT 1,
        data          JSONB NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_residents_unit
    ON residents (unit_code, id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_residents_household
    ON residents (household_id, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_records (
        seq            BIGSERIAL PRIMARY KEY,
        id             UUID NOT NULL UNIQUE,
        actor_id       TEXT NOT NULL,
        action         TEXT NOT NULL,
        resource_type  TEXT NOT NULL,
        resource_id    TEXT NOT NULL,
        before_state   JSONB,
        after_state    JSONB NOT NULL,
        recorded_at    TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_audit_resource
    ON audit_records (resource_id, seq)
    "#,
];

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
