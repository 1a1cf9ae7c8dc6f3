//! School records: schools, students, teachers, subjects and subject classes.

use std::sync::Arc;

use serde::Serialize;

use crate::backend::{Backend, Params};
use crate::error::Result;
use crate::json::{self, Decoder, ObjectReader};
use crate::model::{ref_decoder, Model, Ref};
use crate::pagination::ResponsePage;
use crate::service::{Embedded, ModelApiService};

// =============================================================================
// Models
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub name: String,
}

impl Model for School {
    const TYPE: &'static str = "school";

    fn id(&self) -> &str {
        &self.id
    }
}

impl School {
    pub fn decoder() -> Decoder<School> {
        json::object_with(|obj| {
            obj.constant("type", Self::TYPE)?;
            Ok(School {
                id: obj.field("id", &json::string())?,
                name: obj.field("name", &json::string())?,
            })
        })
    }
}

/// Name fields shared by students and teachers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    pub first_name: String,
    pub surname: String,
}

impl PersonName {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.surname)
    }

    fn read(obj: &mut ObjectReader<'_>) -> std::result::Result<Self, json::DecodeError> {
        Ok(Self {
            first_name: obj.field("firstName", &json::string())?,
            surname: obj.field("surname", &json::string())?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum YearGroup {
    Junior,
    Senior,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    #[serde(flatten)]
    pub name: PersonName,
    pub student_code: String,
    pub year_level: i64,
    pub compass_number: i64,
}

impl Model for Student {
    const TYPE: &'static str = "student";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Student {
    pub fn decoder() -> Decoder<Student> {
        json::object_with(|obj| {
            obj.constant("type", Self::TYPE)?;
            Ok(Student {
                id: obj.field("id", &json::string())?,
                name: PersonName::read(obj)?,
                student_code: obj.field("studentCode", &json::string())?,
                year_level: obj.field("yearLevel", &json::integer())?,
                compass_number: obj.field("compassNumber", &json::integer())?,
            })
        })
    }

    pub fn full_name(&self) -> String {
        self.name.full_name()
    }

    /// Years 9 and below are junior.
    pub fn group(&self) -> YearGroup {
        if self.year_level <= 9 {
            YearGroup::Junior
        } else {
            YearGroup::Senior
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    #[serde(flatten)]
    pub name: PersonName,
    pub email: String,
    pub teacher_code: String,
}

impl Model for Teacher {
    const TYPE: &'static str = "teacher";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Teacher {
    pub fn decoder() -> Decoder<Teacher> {
        json::object_with(|obj| {
            obj.constant("type", Self::TYPE)?;
            Ok(Teacher {
                id: obj.field("id", &json::string())?,
                name: PersonName::read(obj)?,
                email: obj.field("email", &json::string())?,
                teacher_code: obj.field("teacherCode", &json::string())?,
            })
        })
    }

    pub fn full_name(&self) -> String {
        self.name.full_name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

impl Model for Subject {
    const TYPE: &'static str = "subject";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Subject {
    pub fn decoder() -> Decoder<Subject> {
        json::object_with(|obj| {
            obj.constant("type", Self::TYPE)?;
            Ok(Subject {
                id: obj.field("id", &json::string())?,
                name: obj.field("name", &json::string())?,
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectClass {
    pub id: String,
    pub subject: Ref<Subject>,
    pub teacher: Ref<Teacher>,
    pub year: i64,
    pub subgroup: String,
    pub class_code: String,
    /// First page of the class list, when inlined.
    pub students: Vec<Student>,
    pub students_count: Option<usize>,
}

impl Model for SubjectClass {
    const TYPE: &'static str = "class";

    fn id(&self) -> &str {
        &self.id
    }
}

impl SubjectClass {
    pub fn decoder() -> Decoder<SubjectClass> {
        let subject = ref_decoder(Subject::decoder());
        let teacher = ref_decoder(Teacher::decoder());
        let students = json::array(Student::decoder());
        let count = json::integer().and_then(|n| {
            usize::try_from(n).map_err(|_| format!("Invalid count {n}"))
        });
        json::object_with(move |obj| {
            obj.constant("type", Self::TYPE)?;
            Ok(SubjectClass {
                id: obj.field("id", &json::string())?,
                subject: obj.field("subject", &subject)?,
                teacher: obj.field("teacher", &teacher)?,
                year: obj.field("year", &json::integer())?,
                subgroup: obj.field("subgroup", &json::string())?,
                class_code: obj.field("classCode", &json::string())?,
                students: obj.optional("students", &students)?.unwrap_or_default(),
                students_count: obj.optional("studentsCount", &count)?,
            })
        })
    }
}

// =============================================================================
// Services
// =============================================================================

/// Filters for [`StudentApi::students`]. Empty filters are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilter {
    pub class: Vec<String>,
    pub student: Vec<String>,
}

impl StudentFilter {
    fn params(&self) -> Params {
        let mut params = Params::new();
        if !self.class.is_empty() {
            params = params.set_all("class", self.class.iter().cloned());
        }
        if !self.student.is_empty() {
            params = params.set_all("student", self.student.iter().cloned());
        }
        params
    }
}

#[derive(Debug, Clone)]
pub struct StudentApi {
    service: ModelApiService<Student>,
}

impl StudentApi {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            service: ModelApiService::new(backend, ["/schools", "students"], Student::decoder()),
        }
    }

    pub fn service(&self) -> &ModelApiService<Student> {
        &self.service
    }

    pub async fn students(&self, filter: &StudentFilter) -> Result<ResponsePage<Student>> {
        self.service
            .query(&[], filter.params(), Student::decoder())
            .await
    }
}

#[derive(Debug, Clone)]
pub struct TeacherApi {
    service: ModelApiService<Teacher>,
}

impl TeacherApi {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            service: ModelApiService::new(backend, ["/schools", "teachers"], Teacher::decoder()),
        }
    }

    pub fn service(&self) -> &ModelApiService<Teacher> {
        &self.service
    }

    /// Look a teacher up by their staff code.
    pub async fn by_code(&self, teacher_code: &str) -> Result<Option<Teacher>> {
        self.service
            .query_unique(&[], Params::new().set("code", teacher_code), Teacher::decoder())
            .await
    }
}

#[derive(Debug, Clone)]
pub struct SubjectClassApi {
    service: ModelApiService<SubjectClass>,
}

impl SubjectClassApi {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            service: ModelApiService::new(
                backend,
                ["/schools", "classes"],
                SubjectClass::decoder(),
            ),
        }
    }

    pub fn service(&self) -> &ModelApiService<SubjectClass> {
        &self.service
    }

    /// Classes of `subject` running in `year`.
    pub async fn for_year(&self, subject: &Ref<Subject>, year: i32) -> Result<ResponsePage<SubjectClass>> {
        let params = Params::new()
            .set("subject", subject.id())
            .set("year", year.to_string());
        self.service
            .query(&[], params, SubjectClass::decoder())
            .await
    }

    /// Students enrolled in `class`. An inlined class list is used as the first page.
    pub async fn students(&self, class: &Ref<SubjectClass>) -> Result<ResponsePage<Student>> {
        self.service
            .query_property(
                class,
                "students",
                |class: &SubjectClass| Embedded::new(class.students.clone(), class.students_count),
                Student::decoder(),
            )
            .await
    }
}
