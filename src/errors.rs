//
// Copyright 2016 The Cartographer Authors
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

error_chain! {
    errors {
        NonFinitePosition(cloud_index: usize, vertex_index: usize) {
            description("non-finite vertex position")
            display(
                "cloud {} contains a non-finite position at vertex {}",
                cloud_index, vertex_index
            )
        }

        InvalidCellSize(cell_size: f64) {
            description("cell_size must be positive")
            display("cell_size must be > 0, got {}", cell_size)
        }

        TooManyOrigins(origins_len: usize, clouds_len: usize) {
            description("origins array longer than the cloud array")
            display(
                "origins has {} entries but only {} clouds were supplied; \
                 origins must be no longer than clouds",
                origins_len, clouds_len
            )
        }
    }
}
