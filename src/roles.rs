use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Manager,
    Teacher,
    Parent,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Manager => "manager",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
            Role::Student => "student",
        }
    }

    /// Recomputing averages for a student.
    pub fn can_calculate_grades(&self) -> bool {
        match self {
            Role::Administrator => true,
            Role::Manager | Role::Teacher | Role::Parent | Role::Student => false,
        }
    }

    /// Entering, correcting or importing grades.
    pub fn can_manage_grades(&self) -> bool {
        match self {
            Role::Administrator | Role::Teacher => true,
            Role::Manager | Role::Parent | Role::Student => false,
        }
    }

    /// Cohort-wide rankings.
    pub fn can_view_rankings(&self) -> bool {
        match self {
            Role::Administrator | Role::Manager | Role::Teacher => true,
            Role::Parent | Role::Student => false,
        }
    }

    /// A single student's bulletin. Parents and students are further limited
    /// to their own records by whoever authenticates them.
    pub fn can_view_student_data(&self) -> bool {
        match self {
            Role::Administrator | Role::Manager | Role::Teacher | Role::Parent | Role::Student => {
                true
            }
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_administrators_calculate() {
        assert!(Role::Administrator.can_calculate_grades());
        assert!(!Role::Manager.can_calculate_grades());
        assert!(!Role::Teacher.can_calculate_grades());
    }

    #[test]
    fn families_cannot_see_rankings() {
        assert!(!Role::Parent.can_view_rankings());
        assert!(!Role::Student.can_view_rankings());
        assert!(Role::Teacher.can_view_rankings());
        assert!(Role::Parent.can_view_student_data());
    }

    #[test]
    fn display_matches_command_line_value() {
        use clap::ValueEnum;

        for role in Role::value_variants() {
            assert_eq!(Role::from_str(&role.to_string(), false).unwrap(), *role);
        }
    }
}
