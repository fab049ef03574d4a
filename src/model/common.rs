use uuid::Uuid;

/// Operational identifiers double as analytic keys.
pub type Id = Uuid;

pub fn generate_id() -> Id {
    Uuid::new_v4()
}
