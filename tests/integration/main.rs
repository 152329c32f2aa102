//! End-to-end scans against mock HTTP servers

mod scan_tests;
