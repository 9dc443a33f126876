pub mod resolver;
pub mod scope;

use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{
    AssignmentScope, Classification, DepartmentId, FeeItemId, ProgramId, SchoolYear, SectionId,
    StudentId, YearLevelId,
};

pub use resolver::{FeeResolution, FeeResolver};
pub use scope::ScopeMatcher;

/// optional eligibility filters on a fee item; `None` matches any student
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeFilters {
    pub classification: Option<Classification>,
    pub department_id: Option<DepartmentId>,
    pub program_id: Option<ProgramId>,
    pub year_level_id: Option<YearLevelId>,
    pub section_id: Option<SectionId>,
}

impl ScopeFilters {
    pub fn is_wildcard(&self) -> bool {
        self.classification.is_none()
            && self.department_id.is_none()
            && self.program_id.is_none()
            && self.year_level_id.is_none()
            && self.section_id.is_none()
    }
}

/// billable charge for one school year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeItem {
    pub id: FeeItemId,
    pub name: String,
    pub school_year: SchoolYear,
    pub selling_price: Money,
    pub cost_price: Money,
    pub assignment_scope: AssignmentScope,
    pub filters: ScopeFilters,
    pub is_active: bool,
}

impl FeeItem {
    /// active item billed to every student of the year
    pub fn for_all(name: impl Into<String>, school_year: SchoolYear, selling_price: Money) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            school_year,
            selling_price,
            cost_price: Money::ZERO,
            assignment_scope: AssignmentScope::All,
            filters: ScopeFilters::default(),
            is_active: true,
        }
    }

    /// active item restricted by the given filters
    pub fn scoped(
        name: impl Into<String>,
        school_year: SchoolYear,
        selling_price: Money,
        filters: ScopeFilters,
    ) -> Self {
        Self {
            assignment_scope: AssignmentScope::Specific,
            filters,
            ..Self::for_all(name, school_year, selling_price)
        }
    }

    pub fn with_cost(mut self, cost_price: Money) -> Self {
        self.cost_price = cost_price;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.selling_price.is_negative() {
            return Err(LedgerError::InvalidFeeItem {
                id: self.id,
                message: format!("selling price must not be negative, got {}", self.selling_price),
            });
        }
        if self.cost_price.is_negative() {
            return Err(LedgerError::InvalidFeeItem {
                id: self.id,
                message: format!("cost price must not be negative, got {}", self.cost_price),
            });
        }
        Ok(())
    }
}

/// academic department; carries the classification students inherit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub student_number: String,
    pub name: String,
    pub department_id: Option<DepartmentId>,
    pub program_id: Option<ProgramId>,
    pub year_level_id: Option<YearLevelId>,
    pub section_id: Option<SectionId>,
}

/// a student's scope attributes with classification resolved through the department
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentScope {
    pub student_id: StudentId,
    pub classification: Option<Classification>,
    pub department_id: Option<DepartmentId>,
    pub program_id: Option<ProgramId>,
    pub year_level_id: Option<YearLevelId>,
    pub section_id: Option<SectionId>,
}

impl StudentScope {
    pub fn resolve(student: &Student, department: Option<&Department>) -> Self {
        Self {
            student_id: student.id,
            classification: department.map(|d| d.classification.clone()),
            department_id: student.department_id,
            program_id: student.program_id,
            year_level_id: student.year_level_id,
            section_id: student.section_id,
        }
    }
}
