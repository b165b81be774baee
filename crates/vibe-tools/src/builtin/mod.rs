// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod bash;
pub mod edit_file;
pub mod glob;
pub mod grep;
pub mod notebook_edit;
pub mod parallel;
pub mod read_file;
pub mod web_fetch;
pub mod web_search;
pub mod write_file;
