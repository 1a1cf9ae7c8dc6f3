//! Concrete models and services built on the generic core.

pub mod schools;

pub use schools::{
    PersonName, School, Student, StudentApi, StudentFilter, Subject, SubjectClass,
    SubjectClassApi, Teacher, TeacherApi, YearGroup,
};
