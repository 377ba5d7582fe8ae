// Copyright 2016 Google Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The logging facade the combiner reports progress through. Like mesh I/O
//! or rasterization, the actual sink (stderr, a file, a metrics pipe) is a
//! collaborator that lives outside this crate; the combiner only needs a
//! write-only text interface with no return value and no errors.

/// A write-only sink for progress events ("building N indices", "pruning G
/// cells", "kept V vertices"). Optional: the combiner runs identically
/// without one.
pub trait LogSink {
    fn log(&self, message: &str);
}

/// Discards every message. Used when the caller passes no logger.
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _message: &str) {}
}

impl<F> LogSink for F
where
    F: Fn(&str),
{
    fn log(&self, message: &str) {
        self(message)
    }
}
