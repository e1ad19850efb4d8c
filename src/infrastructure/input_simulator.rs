use crate::domain::output::KeyboardInput;
use tracing::{debug, trace};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, VkKeyScanW, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, VIRTUAL_KEY, VK_RETURN, VK_SHIFT,
};

/// Shift bit in the high byte returned by `VkKeyScanW`
const SHIFT_STATE: i16 = 0x0100;

/// Synthesizes keystrokes into whichever window has focus
pub struct InputSimulator;

impl InputSimulator {
    pub fn new() -> Self {
        Self
    }

    fn send(&self, key: VIRTUAL_KEY, flags: KEYBD_EVENT_FLAGS) -> anyhow::Result<()> {
        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: key,
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };

        let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
        if sent != 1 {
            anyhow::bail!("SendInput rejected key {:?}", key);
        }
        Ok(())
    }

    /// Simulate key press
    pub fn key_down(&self, key: VIRTUAL_KEY) -> anyhow::Result<()> {
        trace!("Key Down: {:?}", key);
        self.send(key, Default::default())
    }

    /// Simulate key release
    pub fn key_up(&self, key: VIRTUAL_KEY) -> anyhow::Result<()> {
        trace!("Key Up: {:?}", key);
        self.send(key, KEYEVENTF_KEYUP)
    }

    /// Simulate key press and release
    pub fn key_press(&self, key: VIRTUAL_KEY) -> anyhow::Result<()> {
        self.key_down(key)?;
        self.key_up(key)?;
        Ok(())
    }

    /// Type one character using the active keyboard layout
    pub fn type_char(&self, ch: char) -> anyhow::Result<()> {
        let mut units = [0u16; 2];
        let encoded = ch.encode_utf16(&mut units);
        if encoded.len() != 1 {
            anyhow::bail!("Character {:?} cannot be typed", ch);
        }

        let scan = unsafe { VkKeyScanW(encoded[0]) };
        if scan == -1 {
            anyhow::bail!("Character {:?} has no key in the current layout", ch);
        }

        let key = VIRTUAL_KEY((scan & 0xFF) as u16);
        let shift = scan & SHIFT_STATE != 0;

        if shift {
            self.key_down(VK_SHIFT)?;
        }
        let result = self.key_press(key);
        if shift {
            self.key_up(VK_SHIFT)?;
        }
        result
    }
}

impl KeyboardInput for InputSimulator {
    fn send_text(&self, text: &str) -> anyhow::Result<()> {
        debug!("Typing {:?}", text);
        for ch in text.chars() {
            self.type_char(ch)?;
        }
        Ok(())
    }

    fn send_enter(&self) -> anyhow::Result<()> {
        self.key_press(VK_RETURN)
    }
}
