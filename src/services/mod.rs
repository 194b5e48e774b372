pub(crate) mod archive;
pub(crate) mod batch_storage;
pub(crate) mod datalab_ocr;
pub(crate) mod extraction;
pub(crate) mod field_extraction;
pub(crate) mod report_batch;
pub(crate) mod report_gateway;
pub(crate) mod similarity;
