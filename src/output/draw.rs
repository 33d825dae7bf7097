// 该文件是 Lookout （瞭望） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;

use crate::{
  labels::ClassNames,
  model::{DetectItem, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_PADDING: i32 = 2;
const LABEL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色
const BOX_COLOR: [u8; 3] = [0, 255, 255]; // 青色
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法加载字体: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  font: FontArc,
  names: ClassNames,
  font_size: f32,
  box_color: [u8; 3],
  label_color: [u8; 3],
  text_color: [u8; 3],
  thickness: i32,
}

impl Draw {
  pub fn new(names: ClassNames) -> Result<Self, DrawError> {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data)?;

    Ok(Self {
      font,
      names,
      font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
      label_color: LABEL_COLOR,
      text_color: TEXT_COLOR,
      thickness: BOX_THICKNESS,
    })
  }

  pub fn names(&self) -> &ClassNames {
    &self.names
  }

  /// 标签文字：类别名称加两位小数的置信度
  pub fn label_text(&self, item: &DetectItem) -> String {
    format!("{} {:.2}", self.names.name(item.class_id), item.score)
  }

  /// 在图像上绘制全部检测结果，返回实际绘制的边框数量
  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) -> usize {
    result
      .iter()
      .filter(|item| self.draw_bbox_with_label(image, item))
      .count()
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) -> bool {
    if image.width() == 0 || image.height() == 0 {
      return false;
    }
    let (w, h) = (image.width() as f32, image.height() as f32);
    let bbox = &item.bbox;

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return false;
    }

    // 由外向内逐圈加粗
    for t in 0..self.thickness {
      let rect_w = x_max - x_min - 2 * t + 1;
      let rect_h = y_max - y_min - 2 * t + 1;
      if rect_w <= 0 || rect_h <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(rect_w as u32, rect_h as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }

    let label = self.label_text(item);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, &self.font, &label);

    // 标签放在边框上方，贴近图像顶部时向下收
    let label_h = (text_h as i32).max(self.font_size as i32) + 2 * LABEL_TEXT_PADDING;
    let label_x = x_min;
    let label_y = (y_min - label_h).max(0);
    let label_w = (text_w as i32 + 2 * LABEL_TEXT_PADDING).min(w as i32 - label_x);

    if label_w > 0 && label_h > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32);
      draw_filled_rect_mut(image, rect, Rgb(self.label_color));
      draw_text_mut(
        image,
        Rgb(self.text_color),
        label_x + LABEL_TEXT_PADDING,
        label_y + LABEL_TEXT_PADDING,
        scale,
        &self.font,
        &label,
      );
    }

    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn label_uses_class_name_and_two_decimals() {
    let draw = Draw::new(ClassNames::coco()).unwrap();
    assert_eq!(draw.label_text(&item(0, 0.876, [0.0; 4])), "person 0.88");
    assert_eq!(draw.label_text(&item(2, 0.5, [0.0; 4])), "car 0.50");
    assert_eq!(draw.label_text(&item(999, 0.91, [0.0; 4])), "unknown 0.91");
  }

  #[test]
  fn empty_result_leaves_image_untouched() {
    let draw = Draw::new(ClassNames::coco()).unwrap();
    let mut image = RgbImage::new(64, 48);
    let before = image.clone();
    assert_eq!(draw.draw_detections(&mut image, &DetectResult::default()), 0);
    assert_eq!(image.as_raw(), before.as_raw());
  }

  #[test]
  fn draws_box_edges_but_not_interior() {
    let draw = Draw::new(ClassNames::coco()).unwrap();
    let mut image = RgbImage::new(100, 100);
    let result = DetectResult::new(vec![item(0, 0.9, [0.2, 0.4, 0.8, 0.9])]);

    assert_eq!(draw.draw_detections(&mut image, &result), 1);
    assert_eq!(image.get_pixel(80, 90), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(79, 89), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(50, 65), &Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let draw = Draw::new(ClassNames::coco()).unwrap();
    let mut image = RgbImage::new(32, 32);
    let result = DetectResult::new(vec![
      item(0, 0.9, [0.5, 0.5, 0.5, 0.9]),
      item(0, 0.9, [1.2, 1.2, 1.5, 1.5]),
    ]);
    assert_eq!(draw.draw_detections(&mut image, &result), 0);
  }
}
