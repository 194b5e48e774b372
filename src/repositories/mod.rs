pub(crate) mod exams;
pub(crate) mod report_files;
pub(crate) mod reports;
