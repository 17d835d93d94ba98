pub mod report_processor;
