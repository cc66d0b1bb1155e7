/*!
# Sheetchart

Turn uploaded Excel workbooks into chart-ready data, served over a JSON API.

## Overview

Users register, upload `.xlsx`/`.xls` workbooks and pick a sheet plus the
columns to plot. The server reads the sheet, pulls out the requested
series and stores the result as a chart definition that a front end can
hand straight to chart.js (2D) or a 3D scatter/bar renderer.

## Architecture

### Workbook layer
- **cell**: Loosely typed cell values and the number coercion used everywhere
- **workbook**: Reading workbooks with calamine and the parsed sheet views
- **error**: Errors of parsing and extraction

### Analysis layer
- **graph**: 2D series and 3D point extraction
- **colors**: Deterministic per-point color palette
- **summary**: Per-column descriptive statistics

### Records
- **store**: JSON file backed records for users, files, charts and password resets
- **config**: Settings read from the environment

### Service layer (feature `web`)
- **login**: Password hashing, sessions and the auth middleware
- **mailer**: Password reset mail
- **app**: Routing, upload handling and the chart endpoints

## Example

```no_run
use sheetchart::graph::extract_chart_data;

let data = extract_chart_data("sales.xlsx", "Q1", "Region", "Revenue", Some(100))?;
println!("{} points", data.len());
# Ok::<(), sheetchart::error::ChartError>(())
```
*/

pub mod cell;
pub mod colors;
pub mod config;
pub mod error;
pub mod graph;
pub mod store;
pub mod summary;
pub mod workbook;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod mailer;
