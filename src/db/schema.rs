/// One JSON document per cog and scope. Unused id columns hold ''.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        cog TEXT NOT NULL,
        scope TEXT NOT NULL,
        guild_id TEXT NOT NULL DEFAULT '',
        user_id TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (cog, scope, guild_id, user_id)
    );
    CREATE INDEX IF NOT EXISTS idx_documents_guild ON documents (cog, scope, guild_id);
";
