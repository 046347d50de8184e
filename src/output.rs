use crate::dashboard::UserCommand;
use crate::raster::{fill_rect, TextPainter};
use anyhow::Result;
use image::{Rgba, RgbaImage};
use minifb::{InputCallback, Key, KeyRepeat};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

const HUD_TEXT: Rgba<u8> = Rgba([0xd4, 0xaf, 0x37, 255]);
const HUD_BACKDROP: Rgba<u8> = Rgba([0, 0, 0, 150]);
const PROMPT_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Maps a key press outside prompt entry to a dashboard command.
pub fn command_for_key(key: Key) -> Option<UserCommand> {
    let slot = |n: usize| Some(UserCommand::TryOnSlot(n));
    match key {
        Key::E => Some(UserCommand::EnableCamera),
        Key::D => Some(UserCommand::DisableCamera),
        Key::R => Some(UserCommand::RetryCamera),
        Key::Space => Some(UserCommand::ToggleScanning),
        Key::C => Some(UserCommand::CycleCategory),
        Key::Escape => Some(UserCommand::Quit),
        Key::Key1 => slot(0),
        Key::Key2 => slot(1),
        Key::Key3 => slot(2),
        Key::Key4 => slot(3),
        Key::Key5 => slot(4),
        Key::Key6 => slot(5),
        Key::Key7 => slot(6),
        Key::Key8 => slot(7),
        Key::Key9 => slot(8),
        _ => None,
    }
}

/// Line editor for the style prompt. Every edit is published so the
/// recommendation query follows the text as it is typed.
#[derive(Debug, Default)]
pub struct PromptEditor {
    editing: bool,
    text: String,
}

impl PromptEditor {
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn begin(&mut self) {
        self.editing = true;
    }

    pub fn type_char(&mut self, c: char) -> Option<UserCommand> {
        if !self.editing || c.is_control() {
            return None;
        }
        self.text.push(c);
        Some(UserCommand::SetPrompt(self.text.clone()))
    }

    pub fn key(&mut self, key: Key) -> Option<UserCommand> {
        match key {
            Key::Backspace => self.text.pop().map(|_| UserCommand::SetPrompt(self.text.clone())),
            Key::Enter | Key::NumPadEnter => {
                self.editing = false;
                Some(UserCommand::SubmitPrompt)
            }
            Key::Escape => {
                self.editing = false;
                None
            }
            _ => None,
        }
    }
}

struct CharQueue(Rc<RefCell<VecDeque<char>>>);

impl InputCallback for CharQueue {
    fn add_char(&mut self, uni_char: u32) {
        if let Some(c) = char::from_u32(uni_char) {
            self.0.borrow_mut().push_back(c);
        }
    }
}

pub struct WindowOutput {
    window: minifb::Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    typed: Rc<RefCell<VecDeque<char>>>,
    prompt: PromptEditor,
    text: TextPainter,
    text_size: f32,
}

impl WindowOutput {
    pub fn new(title: &str, width: usize, height: usize, text: TextPainter, text_size: f32) -> Result<Self> {
        let mut window = minifb::Window::new(
            title,
            width,
            height,
            minifb::WindowOptions {
                resize: true,
                ..minifb::WindowOptions::default()
            },
        )
        .map_err(|e| anyhow::anyhow!("Failed to create window: {}", e))?;

        window.limit_update_rate(Some(std::time::Duration::from_micros(16600))); // ~60 FPS

        let typed = Rc::new(RefCell::new(VecDeque::new()));
        window.set_input_callback(Box::new(CharQueue(Rc::clone(&typed))));

        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
            typed,
            prompt: PromptEditor::default(),
            text,
            text_size,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// Commands from keys pressed since the last frame. Tab enters prompt
    /// entry, where typing edits the prompt until Enter or Esc.
    pub fn poll_commands(&mut self) -> Vec<UserCommand> {
        let mut commands = Vec::new();
        let typed: Vec<char> = self.typed.borrow_mut().drain(..).collect();

        for key in self.window.get_keys_pressed(KeyRepeat::Yes) {
            if self.prompt.is_editing() {
                commands.extend(self.prompt.key(key));
            } else if key == Key::Tab {
                self.prompt.begin();
            } else if let Some(command) = command_for_key(key) {
                commands.push(command);
            }
        }
        // chars typed along with the Tab that opened the editor are dropped
        if self.prompt.is_editing() {
            for c in typed {
                commands.extend(self.prompt.type_char(c));
            }
        }
        commands
    }

    /// Shows `frame` (or a blank canvas before the first frame) with the HUD on top.
    pub fn present(&mut self, frame: Option<RgbaImage>, hud: &[String]) -> Result<()> {
        let mut canvas = frame.unwrap_or_else(|| RgbaImage::from_pixel(self.width as u32, self.height as u32, Rgba([16, 16, 16, 255])));
        self.draw_hud(&mut canvas, hud);

        let (w, h) = (canvas.width() as usize, canvas.height() as usize);
        if (w, h) != (self.width, self.height) {
            self.width = w;
            self.height = h;
        }
        self.buffer.resize(w * h, 0);
        for (slot, pixel) in self.buffer.iter_mut().zip(canvas.pixels()) {
            let [r, g, b, _] = pixel.0;
            *slot = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
        }

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| anyhow::anyhow!("Window update failed: {}", e))
    }

    fn draw_hud(&self, canvas: &mut RgbaImage, hud: &[String]) {
        let line_h = self.text.line_height(self.text_size) as i32;
        let pad = 8;
        let panel_w = hud
            .iter()
            .map(|l| self.text.width(l, self.text_size))
            .max()
            .unwrap_or(0)
            + 2 * pad as u32;
        let panel_h = hud.len() as u32 * line_h as u32 + 2 * pad as u32;
        fill_rect(canvas, 0, 0, panel_w, panel_h, HUD_BACKDROP);

        for (i, line) in hud.iter().enumerate() {
            self.text
                .draw(canvas, pad, pad + i as i32 * line_h, line, HUD_TEXT, self.text_size);
        }

        if self.prompt.is_editing() {
            let y = canvas.height() as i32 - line_h - pad;
            let line = format!("> {}_", self.prompt.text());
            fill_rect(canvas, 0, y - pad / 2, canvas.width(), (line_h + pad) as u32, HUD_BACKDROP);
            self.text.draw(canvas, pad, y, &line, PROMPT_TEXT, self.text_size);
        }
    }
}
