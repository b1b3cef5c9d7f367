use serde::{Deserialize, Serialize};

// ============================================================================
// Organization / Course
//
// Owned by the dashboard. Only the columns the settings engine needs.
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub created_at: String,
}
