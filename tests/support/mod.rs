pub mod serial_mock;
