// 该文件是 Lookout （瞭望） 项目的一部分。
// src/labels.rs - 类别名称表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

const UNKNOWN_LABEL: &str = "unknown";

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum LabelsError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别表格式错误: {0}")]
  FormatError(String),
}

/// 类别编号到名称的映射，决定标签文字
#[derive(Debug, Clone)]
pub struct ClassNames {
  names: Vec<String>,
}

impl Default for ClassNames {
  fn default() -> Self {
    Self::coco()
  }
}

impl ClassNames {
  pub fn coco() -> Self {
    Self::new(COCO_CLASSES.iter().map(|name| name.to_string()).collect())
  }

  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  /// 从 JSON 文件加载
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LabelsError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let names = Self::from_json_str(&text)?;
    info!(
      "从 {} 加载了 {} 个类别名称",
      path.as_ref().display(),
      names.len()
    );
    Ok(names)
  }

  /// 支持两种格式：名称数组 `["person", ...]`，
  /// 或编号到名称的对象 `{"0": "person", ...}`
  pub fn from_json_str(text: &str) -> Result<Self, LabelsError> {
    match serde_json::from_str::<Value>(text)? {
      Value::Array(items) => {
        let names = items
          .into_iter()
          .enumerate()
          .map(|(idx, item)| match item {
            Value::String(name) => Ok(name),
            other => Err(LabelsError::FormatError(format!(
              "第 {} 项不是字符串: {}",
              idx, other
            ))),
          })
          .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(names))
      }
      Value::Object(map) => {
        let mut pairs = Vec::with_capacity(map.len());
        for (key, value) in map {
          let id = key
            .parse::<usize>()
            .map_err(|_| LabelsError::FormatError(format!("类别编号无效: {}", key)))?;
          let name = match value {
            Value::String(name) => name,
            other => {
              return Err(LabelsError::FormatError(format!(
                "类别 {} 的名称不是字符串: {}",
                id, other
              )));
            }
          };
          pairs.push((id, name));
        }

        let len = pairs.iter().map(|(id, _)| id + 1).max().unwrap_or(0);
        let mut names = vec![UNKNOWN_LABEL.to_string(); len];
        for (id, name) in pairs {
          names[id] = name;
        }
        Ok(Self::new(names))
      }
      other => Err(LabelsError::FormatError(format!(
        "期望数组或对象，实际为: {}",
        other
      ))),
    }
  }

  pub fn name(&self, class_id: u32) -> &str {
    self
      .names
      .get(class_id as usize)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_is_default() {
    let names = ClassNames::default();
    assert_eq!(names.len(), 80);
    assert_eq!(names.name(0), "person");
    assert_eq!(names.name(79), "toothbrush");
    assert_eq!(names.name(80), "unknown");
  }

  #[test]
  fn parses_name_array() {
    let names = ClassNames::from_json_str(r#"["cat", "dog"]"#).unwrap();
    assert_eq!(names.name(1), "dog");
    assert_eq!(names.len(), 2);
  }

  #[test]
  fn parses_id_map_with_gaps() {
    let names = ClassNames::from_json_str(r#"{"0": "cat", "2": "bird"}"#).unwrap();
    assert_eq!(names.len(), 3);
    assert_eq!(names.name(0), "cat");
    assert_eq!(names.name(1), "unknown");
    assert_eq!(names.name(2), "bird");
  }

  #[test]
  fn rejects_bad_shapes() {
    assert!(matches!(
      ClassNames::from_json_str("42"),
      Err(LabelsError::FormatError(_))
    ));
    assert!(matches!(
      ClassNames::from_json_str(r#"[1, 2]"#),
      Err(LabelsError::FormatError(_))
    ));
    assert!(matches!(
      ClassNames::from_json_str(r#"{"x": "cat"}"#),
      Err(LabelsError::FormatError(_))
    ));
    assert!(matches!(
      ClassNames::from_json_str("not json"),
      Err(LabelsError::JsonError(_))
    ));
  }
}
