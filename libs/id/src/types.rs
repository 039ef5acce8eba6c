//! Typed ID definitions.
//!
//! Each ID type has a unique prefix that identifies the resource type. The
//! resource manager issues most of these; `new()` exists for mocks and tests.

use crate::define_id;

define_id!(ContainerId, "container");
define_id!(AppAttemptId, "appattempt");
